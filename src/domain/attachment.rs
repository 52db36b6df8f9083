use crate::error::AttachmentError;

/// A relation that must be loaded explicitly before it can be read.
#[derive(Debug, Clone, PartialEq)]
pub enum Attachment<T> {
    Unloaded,
    Loaded(T),
}

impl<T> Default for Attachment<T> {
    fn default() -> Self {
        Attachment::Unloaded
    }
}

impl<T> Attachment<T> {
    pub fn require(&self, what: &'static str) -> Result<&T, AttachmentError> {
        match self {
            Attachment::Loaded(value) => Ok(value),
            Attachment::Unloaded => Err(AttachmentError { what }),
        }
    }

    pub fn require_mut(&mut self, what: &'static str) -> Result<&mut T, AttachmentError> {
        match self {
            Attachment::Loaded(value) => Ok(value),
            Attachment::Unloaded => Err(AttachmentError { what }),
        }
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Attachment::Loaded(value) => Some(value),
            Attachment::Unloaded => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Attachment::Loaded(_))
    }
}
