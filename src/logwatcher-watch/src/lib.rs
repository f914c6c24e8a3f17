//! LogWatcher Watch - platform-aware change detection and incremental
//! tailing. Everything here owns file handles or OS watcher resources; the
//! pure data model lives in `logwatcher-core`.

pub mod detector;
pub mod error;
pub mod tailer;

pub use detector::{ChangeDetector, FileChanged};
pub use error::WatchError;
pub use tailer::Tailer;
