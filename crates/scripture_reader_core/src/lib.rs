pub mod cache;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod memory;
pub mod navigation;
pub mod panels;
pub mod ports;
pub mod reader;
pub mod selection;
pub mod session;

pub use domain::{Book, Chapter, Highlight, HighlightColor, SlotId, User, Verse, VersionSlot, DEFAULT_VERSION};
pub use error::{ReaderError, ReaderResult};
pub use fetcher::{VerseFetcher, VerseKey};
pub use memory::InMemoryStore;
pub use navigation::NavigationState;
pub use panels::{PanelChange, PanelRejection, PanelSet};
pub use ports::{AuthEvent, AuthProvider, AuthSessionStore, PortError, PortResult, ScriptureStore};
pub use reader::{ReaderEffects, ReaderSnapshot, ReaderView};
pub use session::SessionContext;
