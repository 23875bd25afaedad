use crate::pet::Personality;
use rand::seq::SliceRandom;
use rand::Rng;

fn lines(personality: Personality) -> &'static [&'static str] {
    match personality {
        Personality::Cold => &["Hmph.", "Mm.", "Oh. It's you."],
        Personality::Clingy => &["You're back!", "Finally, you're here!", "I missed you so much!"],
        Personality::Playful => &["Meow meow!", "Woof woof!", "Hi there! Play with me!"],
        Personality::Quiet => &["Hello.", "Mm.", "I'm here."],
    }
}

/// A proactive greeting in the pet's voice.
pub fn pick<R: Rng + ?Sized>(personality: Personality, rng: &mut R) -> &'static str {
    lines(personality).choose(rng).copied().unwrap_or("Hello.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_pick_matches_personality() {
        let mut rng = StdRng::seed_from_u64(7);
        for personality in [
            Personality::Cold,
            Personality::Clingy,
            Personality::Playful,
            Personality::Quiet,
        ] {
            let line = pick(personality, &mut rng);
            assert!(lines(personality).contains(&line));
        }
    }
}
