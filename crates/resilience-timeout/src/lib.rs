//! The timeout strategy: races a wrapped callback against a per-call timer.
//!
//! ```no_run
//! use std::time::Duration;
//! use resilience_timeout::TimeoutOptions;
//!
//! let strategy = TimeoutOptions::builder()
//!     .timeout(Duration::from_secs(2))
//!     .on_timeout(|timeout| eprintln!("call exceeded {timeout:?}"))
//!     .build()
//!     .expect("valid options");
//! ```

mod events;
mod options;
mod strategy;

pub use events::TimeoutEvent;
pub use options::{TimeoutGenerator, TimeoutOptions, TimeoutOptionsBuilder};
pub use strategy::TimeoutStrategy;
