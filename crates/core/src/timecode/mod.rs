pub mod frame_rate;
pub mod scan;
pub mod timecode;

pub use frame_rate::FrameRate;
pub use scan::{find_token, scan_line};
pub use timecode::TimeCode;
