//! This crate is the storage and synchronisation core of a terminal task manager.
//!
//! Tasks live in two local lists (the active list and the archive), stored as JSON files by the [`cache`] module.
//! The [`Store`] owns these lists. Every change is persisted at once, and changes to tasks of the `remote` list are
//! reflected on a CalDAV collection of `VTODO` items.
//!
//! It provides a CalDAV client in the [`client`] module, that speaks the small part of CalDAV it needs to manage one collection.
//! The [`sync`] module decides how the local lists and the server content are merged. \
//! Everything that talks to a server goes through the [`TaskRemote`](traits::TaskRemote) trait, so that tests can use
//! the in-memory [`MockRemote`](mock_remote::MockRemote) instead.
//!
//! ```no_run
//! # async fn run() -> cbra_tasks::Result<()> {
//! use cbra_tasks::{Config, Store};
//!
//! let config = Config::from_toml_str(r#"
//!     [sync]
//!     enabled = true
//!     url = "https://dav.example.com/calendars"
//!     username = "alice"
//!     password = "secret"
//! "#)?;
//! let store = Store::open(&config)?;
//! store.add_from_input("Buy milk +shopping +1d").await?;
//! let report = store.sync().await?;
//! println!("{} tasks pulled", report.pulled);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, Result};
pub mod clock;
pub use clock::{Clock, MockClock, SystemClock};
pub mod config;
pub use config::Config;

pub mod task;
pub use task::{CompletionStatus, ListName, Task};
pub mod due;
pub mod input;
pub mod grade;

pub mod ical;
pub mod traits;
pub mod client;
pub mod mock_remote;
pub mod utils;

pub mod cache;
pub mod query;
pub mod sync;
pub use sync::{SyncReport, SyncWarning};
pub mod store;
pub use store::{NewTask, Store, TaskEdit};
