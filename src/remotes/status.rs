use crate::digest::Digest;
use oci_spec::image::Descriptor;
use std::sync::{Mutex, PoisonError};

/// Progress of a walk over the content graph
///
/// Records every visited descriptor in visit order and reports each one
/// through `log`. Shared by reference between the nodes being dispatched.
#[derive(Debug)]
pub struct StatusTracker {
    action: &'static str,
    visited: Mutex<Vec<Descriptor>>,
}

impl StatusTracker {
    pub fn new(action: &'static str) -> Self {
        StatusTracker {
            action,
            visited: Mutex::new(Vec::new()),
        }
    }

    pub fn visit(&self, desc: &Descriptor) {
        let mut visited = self.visited.lock().unwrap_or_else(PoisonError::into_inner);
        visited.push(desc.clone());
        let short = Digest::from_descriptor(desc)
            .map(|d| d.short().to_string())
            .unwrap_or_else(|_| desc.digest().clone());
        log::info!(
            "{} {:>3} {} {} ({} bytes)",
            self.action,
            visited.len(),
            short,
            desc.media_type(),
            desc.size()
        );
    }

    pub fn count(&self) -> usize {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn into_visited(self) -> Vec<Descriptor> {
        self.visited
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
