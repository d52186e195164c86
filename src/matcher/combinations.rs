//! Pairwise-clique combination enumeration.
//!
//! Given, for each catalogue slot, the rows that lie near an anchor entry,
//! yields every assignment of at most one row per slot such that every two
//! chosen rows are admitted by a pairwise predicate. Slot 0 holds the anchor
//! and is always present; assignments with no other slot filled are skipped.
//!
//! Enumeration is depth-first over slots. Within a slot, rows are tried in the
//! given order and "absent" last, so the output order is deterministic.

/// Enumerate admissible assignments for one anchor.
///
/// `neighbours[0]` must contain exactly the anchor row. `admits((slot_a, row_a),
/// (slot_b, row_b))` decides whether two chosen rows may appear together.
pub fn clique_combinations<F>(
    neighbours: &[Vec<usize>],
    mut admits: F,
) -> Vec<Vec<Option<usize>>>
where
    F: FnMut((usize, usize), (usize, usize)) -> bool,
{
    let mut out = Vec::new();
    let Some(anchor) = neighbours.first().and_then(|n| n.first()).copied() else {
        return out;
    };
    let mut chosen: Vec<Option<usize>> = vec![None; neighbours.len()];
    chosen[0] = Some(anchor);
    extend(neighbours, 1, &mut chosen, &mut admits, &mut out);
    out
}

fn extend<F>(
    neighbours: &[Vec<usize>],
    slot: usize,
    chosen: &mut Vec<Option<usize>>,
    admits: &mut F,
    out: &mut Vec<Vec<Option<usize>>>,
) where
    F: FnMut((usize, usize), (usize, usize)) -> bool,
{
    if slot == neighbours.len() {
        if chosen[1..].iter().any(Option::is_some) {
            out.push(chosen.clone());
        }
        return;
    }

    for &row in &neighbours[slot] {
        let compatible = (0..slot).all(|prev| match chosen[prev] {
            Some(prev_row) => admits((prev, prev_row), (slot, row)),
            None => true,
        });
        if compatible {
            chosen[slot] = Some(row);
            extend(neighbours, slot + 1, chosen, admits, out);
        }
    }
    chosen[slot] = None;
    extend(neighbours, slot + 1, chosen, admits, out);
}
