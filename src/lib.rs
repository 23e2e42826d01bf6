//! An embedded, persistent key-value store built on a log-structured
//! storage engine with a pluggable in-memory index — a Bitcask-style
//! engine.
//!
//! ```no_run
//! use logcask::Config;
//!
//! let engine = Config::new("/tmp/logcask-example").open()?;
//! engine.put("name", "trojan")?;
//! assert_eq!(engine.get(b"name")?.as_ref(), b"trojan");
//! engine.close()?;
//! # Ok::<(), logcask::Error>(())
//! ```

mod batch;
mod codec;
mod data_file;
mod engine;
mod error;
mod io;
mod keydir;
mod lock;
mod merge;
mod options;
mod utils;
mod varint;

pub use batch::WriteBatch;
pub use engine::{Engine, Stat};
pub use error::{Error, Result};
pub use keydir::IndexType;
pub use options::{Config, WriteBatchOptions};
