use rand::Rng;
use serde::Serialize;

/// Faces the die can land on. The die is labelled 1..=6 but the top face is
/// never reachable, so stickers stay out of the rotation while clips answer
/// one roll in five.
pub const DICE_FACES: u32 = 5;

/// A sticker needs a roll above this.
pub const STICKER_ABOVE: u32 = 5;

/// A clip needs a roll above this.
pub const CLIP_ABOVE: u32 = 4;

/// The strategy picked for one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Sticker,
    Clip,
    Text,
    None,
}

/// First match wins: sticker, clip, generated text, silence.
pub fn decide(roll: u32, has_stickers: bool, has_clips: bool, has_chain: bool) -> ReplyKind {
    if roll > STICKER_ABOVE && has_stickers {
        ReplyKind::Sticker
    } else if roll > CLIP_ABOVE && has_clips {
        ReplyKind::Clip
    } else if has_chain {
        ReplyKind::Text
    } else {
        ReplyKind::None
    }
}

/// Rolls the die for every message that needs an answer.
///
/// The face count is fixed: any other die either reaches stickers as often
/// as clips or never reaches clips at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseSelector;

impl ResponseSelector {
    pub fn new() -> Self {
        Self
    }

    /// Uniform roll over `1..=DICE_FACES`.
    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(1..=DICE_FACES)
    }

    pub fn select(&self, has_stickers: bool, has_clips: bool, has_chain: bool) -> ReplyKind {
        self.select_with(&mut rand::thread_rng(), has_stickers, has_clips, has_chain)
    }

    pub fn select_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        has_stickers: bool,
        has_clips: bool,
        has_chain: bool,
    ) -> ReplyKind {
        decide(self.roll(rng), has_stickers, has_clips, has_chain)
    }
}
