//! Word-level highlighting of the text being spoken.
//!
//! The driver finds the page block a chunk came from, wraps its words and
//! walks an active marker across them on a timer derived from the chunk's
//! real audio duration. Alignment is approximate by design of the timer;
//! there is no forced alignment against the audio.

pub mod driver;
pub mod matcher;
pub mod page;
pub mod schedule;

pub use driver::{HighlightDriver, HighlightPlan};
pub use matcher::{BlockMatch, BlockMatcher, start_word_index};
pub use page::{HighlightSurface, PageBlock, PageModel};
pub use schedule::{WordSchedule, WordSlot};
