/*!
Assignment of external option names to fields, with conflict resolution.

Every field starts out wanting its bare attribute name. When two or more
fields across the registration tree would claim the same option string, the
session's [`ConflictPolicy`] decides what happens: grow discriminating
prefixes out of the fields' destination paths, prefix everything up front,
refuse outright, or merge same-structure registrations into one list-valued
argument (the merge itself happens before naming; see the emitter).

Resolution is deterministic and idempotent: the same registrations in the
same order always produce the same names.
*/

use std::collections::HashMap;

use log::debug;

use crate::error::{Error, ErrorKind};
use crate::util::segments;

/// What to do when two fields would share an external option name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Leave names bare where possible; on a collision, render every
    /// conflicting field as `<destination_path>.<attribute>`, growing one
    /// path segment at a time (innermost first) until the ambiguity is
    /// gone. A field that is strictly less nested than every other
    /// claimant keeps its shorter name.
    #[default]
    PrefixOnConflict,

    /// Render every field under its full destination path, collision or
    /// not, for total predictability across program versions.
    AlwaysPrefix,

    /// Any collision is a hard error; no automatic disambiguation.
    RejectOnConflict,

    /// Collisions between registrations of the *same* structure type merge
    /// into a single list-valued argument, one value per instance in
    /// registration order. Collisions between different types remain hard
    /// errors.
    MergeIntoList,
}

/// Working state for one field's name while resolution runs.
#[derive(Debug, Clone)]
pub(crate) struct NameEntry {
    /// Index of the registration this field came from, for tie-breaking.
    pub registration: usize,

    /// Full destination path of the field.
    pub path: String,

    /// Destination path of the owning structure.
    pub parent: String,

    /// The name the field starts from: its attribute name, or a pinned
    /// override.
    pub bare: String,

    /// Pinned names (overrides and built-ins) are never prefixed.
    pub pinned: bool,

    /// Alternate option strings. Aliases are never prefixed and collide
    /// fatally.
    pub aliases: Vec<String>,

    /// How many parent-path segments are currently prefixed on.
    used: usize,
}

impl NameEntry {
    pub fn new(
        registration: usize,
        path: String,
        parent: String,
        bare: String,
        pinned: bool,
        aliases: Vec<String>,
    ) -> Self {
        Self {
            registration,
            path,
            parent,
            bare,
            pinned,
            aliases,
            used: 0,
        }
    }

    /// The current external name: the last `used` segments of the parent
    /// path, then the bare name.
    pub fn external(&self) -> String {
        let mut name = String::new();
        let total = self.nesting();

        for segment in segments(&self.parent).skip(total - self.used) {
            name.push_str(segment);
            name.push('.');
        }

        name.push_str(&self.bare);
        name
    }

    /// Nesting level: the number of segments in the owning structure's
    /// destination path.
    pub fn nesting(&self) -> usize {
        segments(&self.parent).count()
    }

    fn can_grow(&self) -> bool {
        !self.pinned && self.used < self.nesting()
    }

    fn grow(&mut self) {
        debug_assert!(self.can_grow());
        self.used += 1;
    }
}

// enough for any sane nesting depth; hitting it means the definitions are
// pathological
const MAX_ROUNDS: usize = 50;

/// Resolve every entry's external name in place.
pub(crate) fn resolve_names(entries: &mut [NameEntry], policy: ConflictPolicy) -> Result<(), Error> {
    if policy == ConflictPolicy::AlwaysPrefix {
        for entry in entries.iter_mut() {
            if !entry.pinned {
                entry.used = entry.nesting();
            }
        }
    }

    for round in 0..MAX_ROUNDS {
        let Some((option, group)) = first_conflict(entries) else {
            return Ok(());
        };

        debug!(
            "name resolution round {round}: '--{option}' is claimed by {count} fields",
            count = group.len(),
        );

        let conflict_error = || -> Error {
            ErrorKind::ArgumentConflict {
                option: option.clone(),
                paths: group.iter().map(|&i| entries[i].path.clone()).collect(),
            }
            .into()
        };

        match policy {
            ConflictPolicy::RejectOnConflict
            | ConflictPolicy::AlwaysPrefix
            | ConflictPolicy::MergeIntoList => return Err(conflict_error()),

            ConflictPolicy::PrefixOnConflict => {
                // only fields whose *primary* name is the contested one can
                // shed the claim by growing; alias claims are immovable
                let mut targets: Vec<usize> = group
                    .iter()
                    .copied()
                    .filter(|&i| entries[i].external() == option && entries[i].can_grow())
                    .collect();

                targets.sort_by_key(|&i| (entries[i].nesting(), entries[i].registration));

                // a field strictly less nested than every other claimant
                // keeps its shorter name, as long as nothing immovable is
                // holding the contested name too
                if targets.len() == group.len()
                    && let [first, second, ..] = targets[..]
                    && entries[first].nesting() < entries[second].nesting()
                {
                    targets.remove(0);
                }

                if targets.is_empty() {
                    return Err(conflict_error());
                }

                for &i in &targets {
                    let entry = &mut entries[i];
                    entry.grow();
                    debug!(
                        "  field '{path}' renamed to '--{name}'",
                        path = entry.path,
                        name = entry.external(),
                    );
                }
            }
        }
    }

    // ran out of rounds; report whatever is still contested
    let (option, group) = first_conflict(entries).expect("rounds exhausted without a conflict");
    Err(ErrorKind::ArgumentConflict {
        option,
        paths: group.into_iter().map(|i| entries[i].path.clone()).collect(),
    }
    .into())
}

/// Find the first option string claimed by more than one entry, in entry
/// order. Returns the name and the claiming entry indices.
fn first_conflict(entries: &[NameEntry]) -> Option<(String, Vec<usize>)> {
    let mut claims: HashMap<String, Vec<usize>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        let primary = entry.external();
        let names = core::iter::once(primary).chain(
            entry
                .aliases
                .iter()
                .map(|alias| alias.trim_start_matches('-').to_owned()),
        );

        for name in names {
            let claimants = claims.entry(name.clone()).or_insert_with(|| {
                order.push(name);
                Vec::new()
            });
            claimants.push(index);
        }
    }

    order.into_iter().find_map(|name| {
        let claimants = &claims[&name];
        (claimants.len() > 1).then(|| (name.clone(), claimants.clone()))
    })
}
