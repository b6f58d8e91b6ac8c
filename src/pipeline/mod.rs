//! Pipeline components: cancel token, channels, semaphore, and the stages built on them.
//!
//! Generator → Step(s) → optional Split/Merge → Sink, all sharing one [`CancelToken`].

pub mod cancel;
pub mod channel;
pub mod generator;
pub mod merge;
pub mod observer;
pub mod semaphore;
pub mod sink;
pub mod split;
pub mod step;

pub use cancel::{CANCELLED, CancelToken, DEADLINE_EXCEEDED};
pub use channel::{Forwarded, forward, with_capacity};
pub use generator::{
    Feed, GeneratorHandle, IterFeed, LineFeed, ReceiverFeed, TryIterFeed, generate,
};
pub use merge::{MergeHandle, merge, merge_into};
pub use observer::{Event, LogObserver, Observer, ObserverId, Subject};
pub use semaphore::{Permit, Semaphore};
pub use sink::Sink;
pub use split::{spawn_split, split};
pub use step::Step;
