//! AS4 Core — MEP and message-type vocabulary, PMode model, attachment normalization.

pub mod attachment;
pub mod clock;
pub mod mep;
pub mod message_type;
pub mod pmode;

pub use attachment::{
    secure_attachments, AttachmentHeaders, AttachmentStream, FileAttachment, IncomingAttachment,
    MemoryAttachment, SecurityAttachment, SecurityProcessor,
};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use mep::{Mep, MepBinding};
pub use message_type::{As4MessageType, MessageWrapping};
pub use pmode::{PMode, PModeParty, PModeValidationError, PartySide};
