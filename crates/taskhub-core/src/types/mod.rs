pub mod attendance;
pub mod event;
pub mod flag;
pub mod notification;
pub mod task;
pub mod user;

pub use attendance::{Shift, TenantHours};
pub use event::TaskEvent;
pub use flag::{
    AuthorSnapshot, FlagComment, FlagItemStatus, FlagStatus, TaskFlag, TaskFlagItem,
};
pub use notification::{
    EmailTemplate, InAppNotification, NotificationKind, OutboundMessage, PushContent,
    PushErrorDetails, PushMessage, PushReceipt, PushTicket,
};
pub use task::{
    ClientRef, JobStatus, RepetitionType, SubTask, SubTaskStatus, Task, TaskPriority,
    TaskStatus, TenantScope, new_id,
};
pub use user::{AccountStatus, User, active_only};
