//! Scoped selection state for the quotation composer
//!
//! Parts picked while building a quotation are kept per job id until the
//! composer is closed or the session ends. Nothing is written to disk.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A spare part picked for a job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartSelection {
    pub part_id: String,
    pub name: String,
    pub quantity: u32,
    /// Minor currency units
    pub unit_price: u64,
}

impl PartSelection {
    pub fn subtotal(&self) -> u64 {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }
}

#[derive(Debug, Default)]
pub struct SelectionCache {
    by_job: HashMap<String, Vec<PartSelection>>,
}

impl SelectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a part, or update quantity and price if it is already selected
    pub fn select(&mut self, job_id: &str, part: PartSelection) {
        let parts = self.by_job.entry(job_id.to_string()).or_default();
        match parts.iter_mut().find(|p| p.part_id == part.part_id) {
            Some(existing) => *existing = part,
            None => parts.push(part),
        }
    }

    pub fn deselect(&mut self, job_id: &str, part_id: &str) {
        if let Some(parts) = self.by_job.get_mut(job_id) {
            parts.retain(|p| p.part_id != part_id);
            if parts.is_empty() {
                self.by_job.remove(job_id);
            }
        }
    }

    pub fn selected(&self, job_id: &str) -> &[PartSelection] {
        self.by_job.get(job_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sum of all selected parts for a job
    pub fn parts_total(&self, job_id: &str) -> u64 {
        self.selected(job_id)
            .iter()
            .map(PartSelection::subtotal)
            .fold(0, u64::saturating_add)
    }

    /// Drop the selection when the composer closes
    pub fn close(&mut self, job_id: &str) {
        self.by_job.remove(job_id);
    }

    pub fn clear(&mut self) {
        self.by_job.clear();
    }
}
