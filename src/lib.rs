// Nginx Reaper - policy engine for nginx workers stuck shutting down

pub mod config;
pub mod daemon;
pub mod killer;
pub mod monitor;
pub mod server;

// Re-export commonly used types
pub use config::{ReaperConfig, Settings};
pub use daemon::{Reaper, ReaperMetrics};
pub use monitor::{MemoryAccountant, MemoryInfo, ProcessInfo, ProcessSource};
