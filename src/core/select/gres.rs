// src/core/select/gres.rs

use crate::core::model::node::GresMap;

/// Eliminates cores whose co-located GRES are already consumed (§4.5). A
/// node's GRES are not necessarily core-affine, so the matcher gets the
/// node's raw GRES map and the job's request and returns how many CPUs the
/// remaining GRES capacity allows, independent of the core/memory limits
/// computed alongside it.
pub trait GresMatcher: Send + Sync {
    fn gres_allowed_cpus(&self, node_gres: &GresMap, job_gres: &[crate::core::model::job::GresRequest], node_cpus: u32) -> u32;
}

/// Default matcher: a node can host the job only if every requested GRES
/// kind has enough unallocated count; if so, GRES places no additional cap
/// on CPUs (GRES in this model is not assumed to be one-GRES-per-core).
pub struct SimpleGresMatcher;

impl GresMatcher for SimpleGresMatcher {
    fn gres_allowed_cpus(&self, node_gres: &GresMap, job_gres: &[crate::core::model::job::GresRequest], node_cpus: u32) -> u32 {
        for req in job_gres {
            let Some(entry) = node_gres.get(&req.name) else {
                return 0;
            };
            let available = entry.count.saturating_sub(entry.allocated);
            if available < req.count {
                return 0;
            }
        }
        node_cpus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::job::GresRequest;
    use crate::core::model::node::GresEntry;

    #[test]
    fn rejects_when_gres_unavailable() {
        let mut gres = GresMap::new();
        gres.insert("gpu".to_string(), GresEntry { count: 2, allocated: 2 });
        let matcher = SimpleGresMatcher;
        let req = vec![GresRequest { name: "gpu".to_string(), count: 1 }];
        assert_eq!(matcher.gres_allowed_cpus(&gres, &req, 16), 0);
    }

    #[test]
    fn allows_full_cpus_when_gres_satisfied() {
        let mut gres = GresMap::new();
        gres.insert("gpu".to_string(), GresEntry { count: 4, allocated: 1 });
        let matcher = SimpleGresMatcher;
        let req = vec![GresRequest { name: "gpu".to_string(), count: 2 }];
        assert_eq!(matcher.gres_allowed_cpus(&gres, &req, 16), 16);
    }

    #[test]
    fn no_request_is_unconstrained() {
        let gres = GresMap::new();
        let matcher = SimpleGresMatcher;
        assert_eq!(matcher.gres_allowed_cpus(&gres, &[], 8), 8);
    }
}
