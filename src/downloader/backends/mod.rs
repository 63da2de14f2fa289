// Processing backends

pub mod ytdlp;

pub use ytdlp::YtDlpProcessor;
