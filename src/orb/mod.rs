//! Audio-reactive orb: seeded noise, icosphere base mesh, and the per-frame
//! deformation. Renderer-agnostic; callers draw the vertices however they like.

mod mesh;
mod morph;
mod noise;

pub use mesh::{icosphere, Mesh, Vertex};
pub use morph::{
    Hsl, OrbAnimator, OrbConfig, OrbFrame, OrbMode, OrbMorph, AMPLITUDE_GAIN, DRAWN_SCALE,
    LISTENING_HUE_SPAN, NOISE_GAIN, NOISE_TIME_AXES, ROTATION_STEP_MOBILE, ROTATION_STEP_WEB,
};
pub use noise::Simplex3;
