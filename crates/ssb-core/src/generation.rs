use async_trait::async_trait;
use rand::{seq::SliceRandom, Rng};

use crate::Result;

/// Built-in styles, phrased to follow "Transform this selfie ...".
pub const DEFAULT_STYLES: &[&str] = &[
    "into a Renaissance oil painting of an extremely serious nobleman",
    "as a grumpy medieval knight whose armor is made of baguettes",
    "into a 1980s action movie poster with explosions in the background",
    "as a claymation character in a low-budget children's show",
    "into a cat wearing a tiny business suit at a board meeting",
    "as an astronaut floating through space surrounded by rubber ducks",
    "into a cartoon villain twirling an enormous mustache",
    "as a Viking warrior riding a very confused llama",
    "into a vintage 1920s silent film star with dramatic eyebrows",
    "as a pirate captain whose parrot is a flamingo",
    "into a superhero whose only power is finding lost socks",
    "as a Roman marble statue that is clearly having a bad day",
];

/// Result of a successful transformation.
///
/// Clients may adjust the style label (e.g. when a provider rewrites the prompt);
/// the applied label is what gets archived.
#[derive(Clone, Debug)]
pub struct Transformed {
    pub image: Vec<u8>,
    pub style: String,
}

/// Hexagonal port for the external image-generation service.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn transform(&self, image: Vec<u8>, style: &str) -> Result<Transformed>;
}

/// Uniform draw from a non-empty style list.
pub fn pick_style<'a, R: Rng + ?Sized>(rng: &mut R, styles: &'a [String]) -> Option<&'a str> {
    styles.choose(rng).map(|s| s.as_str())
}
