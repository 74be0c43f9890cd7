//! K-way merge of sorted runs with tombstone cancellation.
//!
//! This is the single merge primitive shared by shard construction and
//! the range query's combine stage. Inputs are runs of wrapped records,
//! **ordered newest first**, each sorted by [`Wrapped::run_order`]. The
//! output is one run in the same order whose contents are the multiset
//! union of the inputs with cancellation applied.
//!
//! Cancellation rule: a tombstone cancels exactly one live copy with
//! equal key + value that comes from an older source — a run with a
//! larger index, or the same run with a smaller timestamp. A tombstone
//! that finds no partner is retained or dropped according to
//! [`TombstonePolicy`]; a live copy with no tombstone above it always
//! survives.

use crate::record::{Record, Wrapped};
use crate::shard::TombstonePolicy;

/// Merges `runs` (newest first, each sorted by `run_order`) into one
/// cancelled, sorted run.
pub(crate) fn cancelling_merge<R: Record>(
    runs: Vec<Vec<Wrapped<R>>>,
    policy: TombstonePolicy,
) -> Vec<Wrapped<R>> {
    let total: usize = runs.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total);

    let mut cursors: Vec<_> = runs
        .into_iter()
        .map(|r| r.into_iter().peekable())
        .collect();

    loop {
        // Smallest key among the run heads.
        let mut min_key: Option<R::Key> = None;
        for cursor in cursors.iter_mut() {
            if let Some(head) = cursor.peek() {
                let smaller = match &min_key {
                    Some(k) => head.key() < k,
                    None => true,
                };
                if smaller {
                    min_key = Some(head.key().clone());
                }
            }
        }
        let Some(key) = min_key else {
            break;
        };

        // Pull the whole equal-key group, tagged with its source index.
        let mut group: Vec<(usize, Wrapped<R>)> = Vec::new();
        for (idx, cursor) in cursors.iter_mut().enumerate() {
            while cursor.peek().is_some_and(|w| *w.key() == key) {
                if let Some(w) = cursor.next() {
                    group.push((idx, w));
                }
            }
        }

        resolve_group(group, policy, &mut out);
    }

    out
}

/// Applies cancellation inside one equal-key group and appends the
/// survivors to `out` in `run_order`.
fn resolve_group<R: Record>(
    group: Vec<(usize, Wrapped<R>)>,
    policy: TombstonePolicy,
    out: &mut Vec<Wrapped<R>>,
) {
    let mut cancelled = vec![false; group.len()];

    // Tombstones are resolved newest first so each one pairs with the
    // oldest live copy still standing.
    let mut tombstones: Vec<usize> = (0..group.len())
        .filter(|&i| group[i].1.is_tombstone())
        .collect();
    tombstones.sort_by(|&a, &b| {
        group[a]
            .0
            .cmp(&group[b].0)
            .then(group[b].1.timestamp().cmp(&group[a].1.timestamp()))
    });

    for t in tombstones {
        let (t_run, t_ts) = (group[t].0, group[t].1.timestamp());

        let mut partner: Option<usize> = None;
        for i in 0..group.len() {
            if cancelled[i] || group[i].1.is_tombstone() || !group[i].1.matches(&group[t].1) {
                continue;
            }
            let (l_run, l_ts) = (group[i].0, group[i].1.timestamp());
            let older = l_run > t_run || (l_run == t_run && l_ts < t_ts);
            if !older {
                continue;
            }
            partner = match partner {
                None => Some(i),
                Some(p) => {
                    let (p_run, p_ts) = (group[p].0, group[p].1.timestamp());
                    if l_run > p_run || (l_run == p_run && l_ts < p_ts) {
                        Some(i)
                    } else {
                        Some(p)
                    }
                }
            };
        }

        if let Some(live) = partner {
            cancelled[live] = true;
            cancelled[t] = true;
        } else if policy == TombstonePolicy::DropUnmatched {
            cancelled[t] = true;
        }
    }

    let mut kept: Vec<Wrapped<R>> = group
        .into_iter()
        .zip(cancelled)
        .filter(|(_, dead)| !dead)
        .map(|((_, w), _)| w)
        .collect();
    kept.sort_by(|a, b| a.run_order(b));
    out.extend(kept);
}

/// Builds a cancelled, sorted run from unsorted buffer entries.
///
/// The entries form a single source, so only same-source (timestamp
/// based) cancellation applies: an erase consumes one matching copy
/// appended before it in the same fill cycle.
pub(crate) fn run_from_unsorted<R: Record>(mut entries: Vec<Wrapped<R>>) -> Vec<Wrapped<R>> {
    entries.sort_by(|a, b| a.run_order(b));
    cancelling_merge(vec![entries], TombstonePolicy::Retain)
}
