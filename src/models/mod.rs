// Domain records for the Meridian client platform.

pub mod client;
pub mod messaging;
pub mod records;

pub use client::{Client, ClientStatus};
pub use messaging::{
    ActivityEntry, Communication, CommunicationStatus, MessageChannel, MessageTemplate,
    Notification, User,
};
pub use records::{Document, DocumentStatus, LoanScenario, Note, Task, TaskStatus};
