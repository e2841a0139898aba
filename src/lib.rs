pub mod error;
pub mod media;
pub mod median;
pub mod sampler;
pub mod background;
pub mod replacer;
pub mod video_processor;
pub mod video_writer;
pub mod memory;
pub mod metadata;
pub mod processor;
pub mod config;

pub use error::BackgroundError;
pub use media::{MediaBackend, VideoSink, VideoSource};
pub use median::{compute_median_image, median_of};
pub use sampler::sample_frames;
pub use background::estimate_background;
pub use replacer::{is_background_like, replace_foreground, replace_frame, OUTPUT_FPS};
pub use video_processor::VideoProcessor;
pub use video_writer::VideoWriter;
pub use memory::{MemoryBackend, MemorySink, MemorySource};
pub use metadata::{RunSummary, Stage, VideoOutcome, VideoStatus};
pub use processor::{FfmpegBackend, ProcessConfig, ProcessOutput, process_videos, process_videos_with};
pub use config::{ConfigLoader, PartialConfig};
