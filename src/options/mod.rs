mod resolver;

pub use resolver::{EffectiveOptions, WolParams, resolve};
