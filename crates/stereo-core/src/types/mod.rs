mod observation;
mod stereo;

pub use observation::*;
pub use stereo::*;
