//! # Derived Leads
//!
//! Nine extra leads computed from the three recorded limb leads.
//!
//! - aVR, aVL, aVF: Goldberger relations, exact.
//! - V1–V6: fixed population regression coefficients with offsets. These are
//!   an approximation, not patient specific, and are kept exactly as below so
//!   downstream consumers see identical numbers.
//!
//! The whole set is recomputed from scratch whenever any input changes.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedLead {
    AVR,
    AVL,
    AVF,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
}

impl DerivedLead {
    pub const ALL: [DerivedLead; 9] = [
        DerivedLead::AVR,
        DerivedLead::AVL,
        DerivedLead::AVF,
        DerivedLead::V1,
        DerivedLead::V2,
        DerivedLead::V3,
        DerivedLead::V4,
        DerivedLead::V5,
        DerivedLead::V6,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DerivedLead::AVR => "aVR",
            DerivedLead::AVL => "aVL",
            DerivedLead::AVF => "aVF",
            DerivedLead::V1 => "V1",
            DerivedLead::V2 => "V2",
            DerivedLead::V3 => "V3",
            DerivedLead::V4 => "V4",
            DerivedLead::V5 => "V5",
            DerivedLead::V6 => "V6",
        }
    }

    /// Value of this lead for one sample of leads I, II and III
    pub fn compute(&self, i: f64, ii: f64, iii: f64) -> f64 {
        match self {
            DerivedLead::AVR => -(i + ii) / 2.0,
            DerivedLead::AVL => i - ii / 2.0,
            DerivedLead::AVF => ii - i / 2.0,
            DerivedLead::V1 => -0.4 * i - 0.2 * ii + 0.1 * iii + 40.0,
            DerivedLead::V2 => -0.3 * i - 0.05 * ii + 0.5 * iii + 30.0,
            DerivedLead::V3 => -0.2 * i + 0.1 * ii + 0.7 * iii + 20.0,
            DerivedLead::V4 => -0.1 * i + 0.25 * ii + 0.8 * iii + 10.0,
            DerivedLead::V5 => 0.1 * i + 0.5 * ii + 0.6 * iii,
            DerivedLead::V6 => 0.3 * i + 0.6 * ii + 0.2 * iii - 10.0,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for DerivedLead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The nine derived sequences, all of equal length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedLeadSet {
    leads: [Vec<f64>; 9],
}

impl DerivedLeadSet {
    pub fn get(&self, lead: DerivedLead) -> &[f64] {
        &self.leads[lead.index()]
    }

    pub fn len(&self) -> usize {
        self.leads[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (DerivedLead, &[f64])> {
        DerivedLead::ALL
            .into_iter()
            .map(move |lead| (lead, self.get(lead)))
    }
}

/// Derive aVR…V6 from leads I, II and III.
///
/// The output length is the shortest input length; samples past it are
/// dropped. Any empty input gives an all-empty set.
pub fn derive_leads(lead_i: &[i32], lead_ii: &[i32], lead_iii: &[i32]) -> DerivedLeadSet {
    let len = lead_i.len().min(lead_ii.len()).min(lead_iii.len());
    let mut set = DerivedLeadSet {
        leads: std::array::from_fn(|_| Vec::with_capacity(len)),
    };

    for ((&i, &ii), &iii) in lead_i.iter().zip(lead_ii).zip(lead_iii) {
        let (i, ii, iii) = (f64::from(i), f64::from(ii), f64::from(iii));
        for lead in DerivedLead::ALL {
            set.leads[lead.index()].push(lead.compute(i, ii, iii));
        }
    }

    set
}
