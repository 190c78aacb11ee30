//! Test and diagnostic elements.

mod collect;
mod null;
mod testsrc;
mod videotestsrc;

pub use collect::CollectSink;
pub use null::NullSink;
pub use testsrc::TestSrc;
pub use videotestsrc::H264TestSrc;
