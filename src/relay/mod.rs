pub mod calls;
pub mod conversations;
pub mod messages;
pub mod presence;
pub mod service;

pub use calls::{CallRelay, join_url};
pub use conversations::{Conversation, group_by_user};
pub use messages::MessageRepository;
pub use presence::UnreadCounter;
pub use service::{RelayService, RelayViews};
