// WHY: Annotation reconciliation engine: sessions, per-paragraph inventories and the reuse pass
// Callers own the store and registry; a `Session` borrows both exclusively for its lifetime

mod engine;
mod guess;
pub mod inventory;
pub mod phrase;
mod preview;
mod session;

pub use engine::ParseOutcome;
pub use inventory::{IdListBatcher, ParagraphInventory, SlotArena, UsedSet};
pub use phrase::{Phrase, PhraseRegistry};
pub use preview::FormRef;
pub use session::{Session, SessionStats};
