//! Views built from repository reads. Rendering and status logic live in
//! higher layers.

use crate::model::{Batch, Link};

/// One batch and its links in link-id order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWithLinks {
    pub batch: Batch,
    pub links: Vec<Link>,
}

impl BatchWithLinks {
    /// Pair each batch with its links. Batches keep their input order; links
    /// that belong to none of the batches are dropped.
    pub fn group(batches: Vec<Batch>, links: Vec<Link>) -> Vec<BatchWithLinks> {
        let mut grouped: Vec<BatchWithLinks> = batches
            .into_iter()
            .map(|batch| BatchWithLinks {
                batch,
                links: Vec::new(),
            })
            .collect();
        for link in links {
            if let Some(entry) = grouped
                .iter_mut()
                .find(|entry| entry.batch.number == link.batch_number)
            {
                entry.links.push(link);
            }
        }
        for entry in &mut grouped {
            entry.links.sort_by_key(|link| link.id);
        }
        grouped
    }
}
