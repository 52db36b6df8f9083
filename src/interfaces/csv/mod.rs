pub mod timeline_writer;
