//! Local slash-commands answered without contacting the model.

use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use thiserror::Error;

pub const MIN_COUNT: u32 = 1;
pub const MAX_COUNT: u32 = 50;
pub const MIN_FACES: u32 = 2;
pub const MAX_FACES: u32 = 1000;

static DICE_EXPR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([0-9]*)d([0-9]+)([+-][0-9]+)?$").expect("dice expression regex is valid")
});

pub const HELP_TEXT: &str = "Commandes disponibles :\n\
/roll NdM[+K|-K] [adv|dis] : lance N dés à M faces avec un modificateur optionnel \
(ex. /roll 2d6+3, /roll d20, /roll 1d20+5 adv).\n\
/help : affiche cette aide.";

/// Rejections, worded for the player.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Usage : /roll NdM[+K|-K] [adv|dis] (ex. /roll 2d6+3)")]
    Usage,
    #[error("Format invalide. Exemples : /roll 2d6+3, /roll d20, /roll 1d20 adv")]
    Format,
    #[error("Expression de dés invalide.")]
    InvalidNumber,
    #[error("Nombre de dés invalide : il doit être compris entre 1 et 50.")]
    CountOutOfRange,
    #[error("Nombre de faces invalide : il doit être compris entre 2 et 1000.")]
    FacesOutOfRange,
    #[error("L'avantage et le désavantage ne s'utilisent qu'avec 1d20 (ex. /roll 1d20+3 adv).")]
    AdvantageNeedsD20,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollMode {
    Normal,
    Advantage,
    Disadvantage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollSpec {
    pub count: u32,
    pub faces: u32,
    pub modifier: i32,
    pub mode: RollMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Roll(RollSpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollOutcome {
    pub spec: RollSpec,
    pub rolls: Vec<u32>,
    /// Die kept under advantage or disadvantage.
    pub kept: Option<u32>,
    pub total: i64,
}

/// Answers `text` if it is a local command, using the OS random source.
pub fn interpret(text: &str) -> Option<String> {
    interpret_with(text, &mut OsRng)
}

pub fn interpret_with<R: RngCore + ?Sized>(text: &str, rng: &mut R) -> Option<String> {
    let reply = match parse_command(text)? {
        Ok(Command::Help) => HELP_TEXT.to_string(),
        Ok(Command::Roll(spec)) => format_outcome(&roll(spec, rng)),
        Err(e) => e.to_string(),
    };
    Some(reply)
}

/// `None` when the text is not a local command at all.
pub fn parse_command(text: &str) -> Option<Result<Command, DiceError>> {
    let mut tokens = text.split_whitespace();
    let head = tokens.next()?.to_lowercase();
    match head.as_str() {
        "/help" => Some(Ok(Command::Help)),
        "/roll" => {
            let args: Vec<&str> = tokens.collect();
            Some(parse_roll(&args).map(Command::Roll))
        }
        _ => None,
    }
}

fn parse_roll(args: &[&str]) -> Result<RollSpec, DiceError> {
    let (expr, mode) = match args {
        [] => return Err(DiceError::Usage),
        [expr] => (*expr, RollMode::Normal),
        [expr, mode] => {
            let mode = match mode.to_lowercase().as_str() {
                "adv" => RollMode::Advantage,
                "dis" => RollMode::Disadvantage,
                _ => return Err(DiceError::Format),
            };
            (*expr, mode)
        }
        _ => return Err(DiceError::Format),
    };

    let caps = DICE_EXPR.captures(expr).ok_or(DiceError::Format)?;
    let count = match &caps[1] {
        "" => 1,
        digits => digits.parse::<u32>().map_err(|_| DiceError::InvalidNumber)?,
    };
    let faces = caps[2]
        .parse::<u32>()
        .map_err(|_| DiceError::InvalidNumber)?;
    let modifier = match caps.get(3) {
        Some(m) => m
            .as_str()
            .parse::<i32>()
            .map_err(|_| DiceError::InvalidNumber)?,
        None => 0,
    };

    if !(MIN_COUNT..=MAX_COUNT).contains(&count) {
        return Err(DiceError::CountOutOfRange);
    }
    if !(MIN_FACES..=MAX_FACES).contains(&faces) {
        return Err(DiceError::FacesOutOfRange);
    }
    if mode != RollMode::Normal && (count != 1 || faces != 20) {
        return Err(DiceError::AdvantageNeedsD20);
    }

    Ok(RollSpec {
        count,
        faces,
        modifier,
        mode,
    })
}

/// Uniform draw in `[1, faces]` by rejection sampling over 32-bit values.
pub fn roll_die<R: RngCore + ?Sized>(rng: &mut R, faces: u32) -> u32 {
    debug_assert!(faces > 0);
    let range = u64::from(faces);
    // Largest multiple of `range` not above 2^32.
    let zone = (1u64 << 32) / range * range;
    loop {
        let value = u64::from(rng.next_u32());
        if value < zone {
            return (value % range) as u32 + 1;
        }
    }
}

pub fn roll<R: RngCore + ?Sized>(spec: RollSpec, rng: &mut R) -> RollOutcome {
    let (rolls, kept) = match spec.mode {
        RollMode::Normal => {
            let rolls: Vec<u32> = (0..spec.count).map(|_| roll_die(rng, spec.faces)).collect();
            (rolls, None)
        }
        RollMode::Advantage | RollMode::Disadvantage => {
            let a = roll_die(rng, 20);
            let b = roll_die(rng, 20);
            let kept = if spec.mode == RollMode::Advantage {
                a.max(b)
            } else {
                a.min(b)
            };
            (vec![a, b], Some(kept))
        }
    };
    let base: i64 = match kept {
        Some(k) => i64::from(k),
        None => rolls.iter().map(|&r| i64::from(r)).sum(),
    };
    RollOutcome {
        spec,
        rolls,
        kept,
        total: base + i64::from(spec.modifier),
    }
}

pub fn format_outcome(outcome: &RollOutcome) -> String {
    let spec = &outcome.spec;
    let modifier = match spec.modifier {
        0 => String::new(),
        m => format!("{m:+}"),
    };
    let suffix = match spec.mode {
        RollMode::Normal => "",
        RollMode::Advantage => " adv",
        RollMode::Disadvantage => " dis",
    };
    let header = format!("🎲 /roll {}d{}{}{}", spec.count, spec.faces, modifier, suffix);

    let rolls = outcome
        .rolls
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let mut detail = format!("Dés : [{rolls}]");
    if let Some(kept) = outcome.kept {
        let label = if spec.mode == RollMode::Advantage {
            "avantage"
        } else {
            "désavantage"
        };
        detail.push_str(&format!(" ({label}, garde {kept})"));
    }
    if spec.modifier != 0 {
        detail.push_str(&format!(" modificateur {modifier}"));
    }

    format!("{header}\n{detail}\nTotal : {}", outcome.total)
}
