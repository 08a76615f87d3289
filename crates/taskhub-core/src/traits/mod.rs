//! Narrow interfaces to the collaborators the lifecycle engine depends on.

pub mod attendance;
pub mod cache;
pub mod clock;
pub mod directory;
pub mod email;
pub mod events;
pub mod inbox;
pub mod notifier;
pub mod push;
pub mod scheduler;
pub mod store;

pub use attendance::AttendanceStore;
pub use cache::CacheStore;
pub use clock::{Clock, FixedClock, SystemClock};
pub use directory::UserDirectory;
pub use email::EmailSender;
pub use events::{EventSink, TracingEventSink};
pub use inbox::NotificationInbox;
pub use notifier::Notifier;
pub use push::PushSender;
pub use scheduler::{JobCallback, JobFuture, JobRegistry};
pub use store::{TaskFilter, TaskStore};
