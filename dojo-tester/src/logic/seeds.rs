use anyhow::{Result, bail};

/// Seeds `all` expands to: a spread of small, large and bit-pattern values.
pub const PRESET_SEEDS: [u64; 8] = [
    1,
    7,
    42,
    1337,
    2024,
    0xDEAD_BEEF,
    0x0123_4567_89AB_CDEF,
    u64::MAX,
];

const DEFAULT_SEED: u64 = 1337;

/// Resolve CLI seed arguments into a deduplicated seed list.
///
/// Accepts decimal integers (negative values use their magnitude), `0x`
/// hexadecimal, and the keyword `all` for [`PRESET_SEEDS`].
pub fn resolve_seed_inputs(tokens: &[String]) -> Result<Vec<u64>> {
    let mut seeds: Vec<u64> = Vec::new();

    for token in tokens {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        if token.eq_ignore_ascii_case("all") {
            for seed in PRESET_SEEDS {
                push_unique(&mut seeds, seed);
            }
            continue;
        }

        push_unique(&mut seeds, parse_seed(token)?);
    }

    if seeds.is_empty() {
        seeds.push(DEFAULT_SEED);
    }

    Ok(seeds)
}

fn parse_seed(token: &str) -> Result<u64> {
    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        return u64::from_str_radix(&hex.replace('_', ""), 16)
            .map_err(|err| anyhow::anyhow!("Unrecognized seed token: {token} ({err})"));
    }
    if let Ok(value) = token.parse::<u64>() {
        return Ok(value);
    }
    if let Ok(value) = token.parse::<i64>() {
        return Ok(value.unsigned_abs());
    }
    bail!("Unrecognized seed token: {token}")
}

fn push_unique(seeds: &mut Vec<u64>, seed: u64) {
    if !seeds.contains(&seed) {
        seeds.push(seed);
    }
}
