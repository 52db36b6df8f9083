use apptx::application::authorizer::PolicyAuthorizer;
use apptx::application::destruction::DestructionEngine;
use apptx::application::dispatcher::EffectDispatcher;
use apptx::application::editor::TransactionEditor;
use apptx::application::post::profile::PostProfile;
use apptx::application::profile::EditorProfile;
use apptx::application::project::membership::MembershipIndexer;
use apptx::application::project::profile::ProjectProfile;
use apptx::application::renderer::{HandleMap, TransactionRenderer};
use apptx::config::Config;
use apptx::domain::object::EditableObject;
use apptx::domain::phid::Phid;
use apptx::domain::ports::{Authorizer, StoreHandle, StoreRead};
use apptx::domain::post::Post;
use apptx::domain::project::Project;
use apptx::domain::transaction::ContentSource;
use apptx::error::EditError;
use apptx::infrastructure::in_memory::InMemoryStore;
#[cfg(feature = "storage-rocksdb")]
use apptx::infrastructure::rocksdb::RocksDBStore;
use apptx::infrastructure::sinks::{InMemorySearchIndex, LogFeedSink, LogMailSink};
use apptx::interfaces::csv::timeline_writer::TimelineWriter;
use apptx::interfaces::json::edit_script::{EditRequest, EditScriptReader, ObjectKind, ObjectRef};
use apptx::logging::init_tracing;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a JSON edit script and print the timelines of touched objects
    Run {
        script: PathBuf,

        /// Fail edits containing transactions with no effect
        #[arg(long)]
        strict: bool,
    },
    /// Print the CSV timeline of a stored object
    Timeline {
        phid: String,

        #[arg(long, value_enum)]
        kind: ObjectKind,
    },
    /// Permanently destroy an object
    Destroy { phid: String },
}

/// Everything the commands share.
struct App {
    store: StoreHandle,
    authorizer: Arc<dyn Authorizer>,
    projects: Arc<ProjectProfile>,
    posts: Arc<PostProfile>,
    dispatcher: EffectDispatcher,
    config: Config,
}

fn open_store(db_path: Option<&Path>) -> Result<StoreHandle> {
    let Some(path) = db_path else {
        return Ok(Arc::new(InMemoryStore::new()));
    };
    open_persistent(path)
}

#[cfg(feature = "storage-rocksdb")]
fn open_persistent(path: &Path) -> Result<StoreHandle> {
    Ok(Arc::new(RocksDBStore::open(path).into_diagnostic()?))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_persistent(_path: &Path) -> Result<StoreHandle> {
    eprintln!(
        "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
    );
    Ok(Arc::new(InMemoryStore::new()))
}

impl App {
    fn new(config: Config, db_path: Option<&Path>) -> Result<Self> {
        let store = open_store(db_path)?;
        let dispatcher = EffectDispatcher::new(
            Arc::new(LogMailSink),
            Arc::new(LogFeedSink),
            Arc::new(InMemorySearchIndex::new()),
            Arc::new(MembershipIndexer::new(store.clone())),
        );
        Ok(Self {
            projects: Arc::new(ProjectProfile::new(&config.projects).into_diagnostic()?),
            posts: Arc::new(PostProfile::new().into_diagnostic()?),
            authorizer: Arc::new(PolicyAuthorizer),
            store,
            dispatcher,
            config,
        })
    }

    fn editor<O: EditableObject>(
        &self,
        profile: Arc<dyn EditorProfile<O>>,
        request: &EditRequest,
    ) -> TransactionEditor<O> {
        TransactionEditor::new(
            self.store.clone(),
            self.authorizer.clone(),
            profile,
            request.actor(),
            ContentSource::Console,
        )
        .with_config(&self.config)
    }

    /// Applies one request and dispatches its effects. Returns the object's
    /// PHID and whether anything changed.
    async fn apply<O: EditableObject>(
        &self,
        profile: Arc<dyn EditorProfile<O>>,
        request: &EditRequest,
        produced: &[Option<Phid>],
    ) -> std::result::Result<(Phid, bool), EditError> {
        let editor = self.editor(profile, request);
        let phid = match &request.object {
            ObjectRef::New => None,
            ObjectRef::Earlier(index) => Some(
                produced.get(*index).cloned().flatten().ok_or_else(|| {
                    EditError::InvalidTransaction(format!("request @{index} produced no object"))
                })?,
            ),
            ObjectRef::Stored(phid) => Some(phid.clone()),
        };
        let object = match phid {
            None => editor.initialize(),
            Some(phid) => editor.load(&phid).await?.ok_or_else(|| {
                EditError::InvalidTransaction(format!("no {} with PHID {phid}", O::KIND))
            })?,
        };

        let outcome = editor
            .apply_transactions(object, request.transactions.clone())
            .await?;
        let report = self.dispatcher.dispatch(&outcome.effects).await;
        for (effect, err) in &report.failures {
            warn!(effect = *effect, "{err}");
        }
        Ok((outcome.object.phid().clone(), !outcome.is_noop()))
    }

    async fn print_timeline<O: EditableObject>(
        &self,
        profile: &dyn EditorProfile<O>,
        phid: &Phid,
    ) -> Result<()> {
        let reader: &dyn StoreRead = self.store.as_ref();
        let xactions = reader.transactions(phid).await.into_diagnostic()?;
        let registry = profile.registry();
        let handles = HandleMap::load(reader, TransactionRenderer::required_handles(registry, &xactions))
            .await
            .into_diagnostic()?;
        let renderer = TransactionRenderer::new(registry, &handles);

        let stdout = io::stdout();
        let mut writer = TimelineWriter::new(stdout.lock());
        writer
            .write_timeline(&xactions, |xaction| renderer.title(xaction))
            .into_diagnostic()
    }

    async fn timeline(&self, kind: ObjectKind, phid: &Phid) -> Result<()> {
        match kind {
            ObjectKind::Project => self.print_timeline::<Project>(self.projects.as_ref(), phid).await,
            ObjectKind::Post => self.print_timeline::<Post>(self.posts.as_ref(), phid).await,
        }
    }

    async fn run(&self, script: &Path) -> Result<()> {
        let file = File::open(script).into_diagnostic()?;
        let requests = EditScriptReader::new(file).requests().into_diagnostic()?;

        let mut produced: Vec<Option<Phid>> = Vec::with_capacity(requests.len());
        let mut touched: Vec<(ObjectKind, Phid)> = Vec::new();
        for (index, request) in requests.iter().enumerate() {
            let result = match request.kind {
                ObjectKind::Project => self.apply::<Project>(self.projects.clone(), request, &produced).await,
                ObjectKind::Post => self.apply::<Post>(self.posts.clone(), request, &produced).await,
            };
            match result {
                Ok((phid, changed)) => {
                    println!("{index}: {} {phid}", if changed { "ok" } else { "no-op" });
                    if changed && !touched.iter().any(|(_, seen)| seen == &phid) {
                        touched.push((request.kind, phid.clone()));
                    }
                    produced.push(Some(phid));
                }
                Err(err) => {
                    println!("{index}: error: {err}");
                    produced.push(None);
                }
            }
        }

        for (kind, phid) in &touched {
            println!();
            println!("# {phid}");
            self.timeline(*kind, phid).await?;
        }
        Ok(())
    }

    async fn destroy(&self, phid: &Phid) -> Result<()> {
        let destroyed = DestructionEngine::new(self.store.clone())
            .destroy(phid)
            .await
            .into_diagnostic()?;
        if destroyed {
            println!("destroyed {phid}");
        } else {
            println!("no object {phid}");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path).into_diagnostic()?,
        None => Config::default(),
    };
    init_tracing(&config.log.filter);
    if let Command::Run { strict: true, .. } = cli.command {
        config.editor.continue_on_no_effect = false;
    }
    let db_path = cli.db_path.clone().or_else(|| config.storage.db_path.clone());
    let app = App::new(config, db_path.as_deref())?;

    match &cli.command {
        Command::Run { script, .. } => app.run(script).await,
        Command::Timeline { phid, kind } => {
            let phid = Phid::parse(phid).into_diagnostic()?;
            app.timeline(*kind, &phid).await
        }
        Command::Destroy { phid } => {
            let phid = Phid::parse(phid).into_diagnostic()?;
            app.destroy(&phid).await
        }
    }
}
