use anyhow::Result;

use crate::cargo;

/// `callguard-common` tiers, each checked with default features off
const TIERS: &[&str] = &["", "foundation", "serde", "observability", "runtime", "test-utils"];

pub fn check_feature_tiers() -> Result<()> {
    for (index, tier) in TIERS.iter().enumerate() {
        let label = if tier.is_empty() { "no features" } else { tier };
        println!("[{}/{}] callguard-common: {label}", index + 1, TIERS.len());

        let mut args = vec!["check", "-p", "callguard-common", "--no-default-features"];
        if !tier.is_empty() {
            args.extend(["--features", *tier]);
        }
        cargo(&args, &format!("callguard-common does not build with {label}"))?;
    }

    println!("all {} tiers build", TIERS.len());
    Ok(())
}
