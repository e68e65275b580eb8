//! The debug module's AND/OR status tree (spec §4.D, §9).
//!
//! A pure function of current ESR state, materialized only when read (spec
//! §9: "do not cache it"). Three levels: per-neighborhood (`L0`),
//! per-shire (`L1`), and global (`L2`).

/// Per-hart debug-aggregate lanes for one neighborhood, each a 16-bit mask
/// (bit `n` is hart `n`'s flag), plus the 16-bit selection mask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NeighborhoodLanes {
    /// Per-hart halted flags.
    pub halted: u16,
    /// Per-hart running flags.
    pub running: u16,
    /// Per-hart resumeack flags.
    pub resumeack: u16,
    /// Per-hart havereset flags.
    pub havereset: u16,
    /// Selection mask (`hactrl[15:0] | hactrl[31:16]`).
    pub selected: u16,
}

/// L0 (per-neighborhood) aggregate, ten bits (spec §4.D).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct L0Status {
    /// At least one selected hart is halted.
    pub anyhalted: bool,
    /// Every selected hart is halted.
    pub allhalted: bool,
    /// At least one selected hart is running.
    pub anyrunning: bool,
    /// Every selected hart is running.
    pub allrunning: bool,
    /// At least one selected hart has `resumeack` set.
    pub anyresumeack: bool,
    /// Every selected hart has `resumeack` set.
    pub allresumeack: bool,
    /// At least one selected hart has `havereset` set.
    pub anyhavereset: bool,
    /// Every selected hart has `havereset` set.
    pub allhavereset: bool,
    /// At least one selected hart is unavailable (selected, not halted, not running).
    pub anyunavailable: bool,
    /// At least one hart is selected in this neighborhood.
    pub anyselected: bool,
}

/// Computes the L0 aggregate for one neighborhood from its raw lanes (spec §4.D).
pub fn compute_l0(lanes: NeighborhoodLanes) -> L0Status {
    let sel = lanes.selected;
    let unavailable = sel & !lanes.halted & !lanes.running;
    L0Status {
        anyhalted: sel & lanes.halted != 0,
        allhalted: sel & lanes.halted == sel,
        anyrunning: sel & lanes.running != 0,
        allrunning: sel & lanes.running == sel,
        anyresumeack: sel & lanes.resumeack != 0,
        allresumeack: sel & lanes.resumeack == sel,
        anyhavereset: sel & lanes.havereset != 0,
        allhavereset: sel & lanes.havereset == sel,
        anyunavailable: unavailable != 0,
        anyselected: sel != 0,
    }
}

/// L1 (per-shire) aggregate across a shire's neighborhoods (spec §4.D).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct L1Status {
    /// At least one selected hart halted, in the left pair of neighborhoods (0, 1).
    pub anyhalted_left: bool,
    /// At least one selected hart halted, in the right pair of neighborhoods (2, 3).
    pub anyhalted_right: bool,
    /// OR-reduced across all neighborhoods.
    pub anyrunning: bool,
    /// AND-reduced across neighborhoods with `anyselected` set; cleared if none do.
    pub allrunning: bool,
    /// OR-reduced across all neighborhoods.
    pub anyresumeack: bool,
    /// AND-reduced across neighborhoods with `anyselected` set; cleared if none do.
    pub allresumeack: bool,
    /// OR-reduced across all neighborhoods.
    pub anyhavereset: bool,
    /// AND-reduced across neighborhoods with `anyselected` set; cleared if none do.
    pub allhavereset: bool,
    /// AND-reduced across neighborhoods with `anyselected` set; cleared if none do.
    pub allhalted: bool,
    /// OR-reduced across all neighborhoods.
    pub anyunavailable: bool,
    /// At least one neighborhood in this shire has a selected hart.
    pub anyselected: bool,
}

/// Folds a shire's neighborhood `L0` values into its `L1` aggregate.
///
/// `neighborhoods` must be given in index order (0, 1, 2, 3, ...); the
/// left/right pair split assumes the first half is "left".
pub fn compute_l1(neighborhoods: &[L0Status]) -> L1Status {
    let half = (neighborhoods.len() / 2).min(neighborhoods.len());
    let (left, right) = neighborhoods.split_at(half);
    let any_selected = neighborhoods.iter().any(|n| n.anyselected);
    let selected_iter = || neighborhoods.iter().filter(|n| n.anyselected);

    L1Status {
        anyhalted_left: left.iter().any(|n| n.anyhalted),
        anyhalted_right: right.iter().any(|n| n.anyhalted),
        anyrunning: neighborhoods.iter().any(|n| n.anyrunning),
        anyresumeack: neighborhoods.iter().any(|n| n.anyresumeack),
        anyhavereset: neighborhoods.iter().any(|n| n.anyhavereset),
        anyunavailable: neighborhoods.iter().any(|n| n.anyunavailable),
        anyselected: any_selected,
        allhalted: any_selected && selected_iter().all(|n| n.allhalted),
        allrunning: any_selected && selected_iter().all(|n| n.allrunning),
        allresumeack: any_selected && selected_iter().all(|n| n.allresumeack),
        allhavereset: any_selected && selected_iter().all(|n| n.allhavereset),
    }
}

/// L2 (global) aggregate across all shires (spec §4.D).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct L2Status {
    /// OR-reduced `anyhalted` within each group of 16 shires.
    pub anyhalted_groups: Vec<bool>,
    /// OR-reduced across all shires.
    pub anyrunning: bool,
    /// AND-reduced across shires with `anyselected` set; cleared if none do.
    pub allrunning: bool,
    /// OR-reduced across all shires.
    pub anyresumeack: bool,
    /// AND-reduced across shires with `anyselected` set; cleared if none do.
    pub allresumeack: bool,
    /// OR-reduced across all shires.
    pub anyhavereset: bool,
    /// AND-reduced across shires with `anyselected` set; cleared if none do.
    pub allhavereset: bool,
    /// AND-reduced across shires with `anyselected` set; cleared if none do.
    pub allhalted: bool,
    /// OR-reduced across all shires.
    pub anyunavailable: bool,
    /// At least one shire has a selected hart.
    pub anyselected: bool,
}

const SHIRE_GROUP_SIZE: usize = 16;

/// Folds all shires' `L1` values into the global `L2` aggregate.
///
/// A shire's `anyhalted` for grouping purposes is `anyhalted_left ||
/// anyhalted_right`.
pub fn compute_l2(shires: &[L1Status]) -> L2Status {
    let any_selected = shires.iter().any(|s| s.anyselected);
    let selected_iter = || shires.iter().filter(|s| s.anyselected);

    let anyhalted_groups = shires
        .chunks(SHIRE_GROUP_SIZE)
        .map(|group| group.iter().any(|s| s.anyhalted_left || s.anyhalted_right))
        .collect();

    L2Status {
        anyhalted_groups,
        anyrunning: shires.iter().any(|s| s.anyrunning),
        anyresumeack: shires.iter().any(|s| s.anyresumeack),
        anyhavereset: shires.iter().any(|s| s.anyhavereset),
        anyunavailable: shires.iter().any(|s| s.anyunavailable),
        anyselected: any_selected,
        allhalted: any_selected && selected_iter().all(|s| s.allhalted),
        allrunning: any_selected && selected_iter().all(|s| s.allrunning),
        allresumeack: any_selected && selected_iter().all(|s| s.allresumeack),
        allhavereset: any_selected && selected_iter().all(|s| s.allhavereset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l0_all_true_when_every_selected_hart_halted() {
        let l0 = compute_l0(NeighborhoodLanes { halted: 0b11, selected: 0b11, ..Default::default() });
        assert!(l0.allhalted);
        assert!(l0.anyhalted);
        assert!(l0.anyselected);
    }

    #[test]
    fn l0_unavailable_when_selected_but_idle() {
        let l0 = compute_l0(NeighborhoodLanes { selected: 0b1, ..Default::default() });
        assert!(l0.anyunavailable);
    }

    #[test]
    fn l1_clears_all_when_no_neighborhood_selected() {
        let unselected = L0Status::default();
        let l1 = compute_l1(&[unselected; 4]);
        assert!(!l1.anyselected);
        assert!(!l1.allhalted);
        assert!(!l1.allrunning);
    }

    #[test]
    fn l1_all_ignores_unselected_neighborhoods() {
        let selected_allhalted = L0Status { anyselected: true, allhalted: true, anyhalted: true, ..Default::default() };
        let unselected = L0Status::default();
        let l1 = compute_l1(&[selected_allhalted, unselected, unselected, unselected]);
        assert!(l1.anyselected);
        assert!(l1.allhalted);
        assert!(l1.anyhalted_left);
    }
}
