//! Override classification against built-in game content.
//!
//! Given a package's declared folder and the full entry listing of its
//! archive, decide whether the package shadows content the engine already
//! loads natively (`Override`) and whether it still needs an explicit slot
//! in the load-order list (`LoadOrder`).
//!
//! Classification runs once per package file; the result is carried in the
//! cached record and never re-evaluated until that record is pruned.

/// Archive paths containing one of these markers are auxiliary
/// infrastructure (GUI assets, script extender payloads) and never count
/// towards override detection.
pub const IGNORED_MARKERS: [&str; 2] = ["Game/GUI/Assets", "ScriptExtender"];

/// Content path prefixes owned by the base game. A package supplying any
/// of these shadows built-in content.
pub const BUILTIN_PREFIXES: [&str; 15] = [
    "Public/Shared/",
    "Public/SharedDev/",
    "Public/Gustav/",
    "Public/GustavDev/",
    "Public/MainUI/",
    "Public/ModBrowser/",
    "Public/DiceSet_01/",
    "Public/DiceSet_02/",
    "Public/DiceSet_03/",
    "Public/DiceSet_04/",
    "Public/DiceSet_06/",
    "Public/Honour/",
    "Public/Engine/",
    "Public/Game/",
    "Public/FW3/",
];

/// Outcome of classifying one package file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    /// The package replaces/shadows built-in content.
    pub override_builtin: bool,

    /// The package must still be pinned into the explicit order list.
    pub load_order: bool,
}

/// Classify one package file.
///
/// `folder` is the `Folder` attribute from the module descriptor, if the
/// descriptor declared one; `listing` is the archive's full entry listing.
/// An empty listing is inconclusive and classifies as a plain,
/// non-overriding package.
pub fn classify(folder: Option<&str>, listing: &[String]) -> Classification {
    let mut classification = Classification::default();
    if listing.is_empty() {
        return classification;
    }

    if let Some(folder) = folder {
        // The package re-supplies its own namespace under Public/: it
        // overrides but still needs an order slot.
        let public_folder = format!("Public/{folder}");
        if listing.iter().any(|path| path.contains(&public_folder)) {
            classification.load_order = true;
        }

        // Loose mod-folder content beyond the descriptor itself cannot be
        // ordered implicitly by the engine.
        let mods_folder = format!("Mods/{folder}");
        let loose_entries = listing
            .iter()
            .filter(|path| path.contains(&mods_folder))
            .count();
        if loose_entries > 1 {
            classification.load_order = true;
        }
    }

    for path in listing {
        if IGNORED_MARKERS.iter().any(|marker| path.contains(marker)) {
            continue;
        }
        if BUILTIN_PREFIXES.iter().any(|prefix| path.contains(prefix)) {
            classification.override_builtin = true;
            break;
        }
    }

    classification
}
