// src/core/node_machine.rs

//! Node state machine transitions (§4.3): registration validation and the
//! heartbeat timeout policy, kept separate from the state store so the
//! transition table itself can be unit tested without the rest of the
//! store's lock machinery.

use crate::config::FastSchedule;
use crate::core::errors::ClusterError;
use crate::core::model::{Node, NodeConfig, NodeFlags, NodeState};

/// Outcome of validating advertised resources at registration time (§3.8 I8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Accepted,
    /// Advertised specs were below the config floor; node is DRAIN'd.
    Drained,
}

/// Validates `advertised` against `config` per the configured
/// `fast_schedule` mode and applies the resulting state/flags to `node`.
pub fn register_node(
    node: &mut Node,
    config: &NodeConfig,
    fast_schedule: FastSchedule,
    advertised_cpus: u32,
    advertised_memory_mb: u64,
    advertised_cores: u32,
    now: i64,
) -> Result<RegistrationOutcome, ClusterError> {
    node.last_response = now;
    node.flags.remove(NodeFlags::NO_RESPOND);

    let trust_advertised = matches!(fast_schedule, FastSchedule::Trust);
    let under_delivered = !config.satisfied_by(advertised_cpus, advertised_memory_mb, advertised_cores);

    if trust_advertised {
        node.cpus = advertised_cpus;
        node.real_memory_mb = advertised_memory_mb;
        node.cores = advertised_cores;
    } else {
        node.cpus = config.cpus;
        node.real_memory_mb = config.real_memory_mb;
        node.cores = config.cores;
    }

    if matches!(fast_schedule, FastSchedule::Trust | FastSchedule::ConfigOnly) && under_delivered {
        node.flags.insert(NodeFlags::DRAIN);
        if node.state == NodeState::Unknown {
            node.state = NodeState::Idle;
        }
        return Ok(RegistrationOutcome::Drained);
    }

    if node.state == NodeState::Unknown {
        node.state = NodeState::Idle;
    }
    Ok(RegistrationOutcome::Accepted)
}

/// Heartbeat timeout policy (§4.3): returns the flag/state change to apply,
/// given how long it has been since the node last responded.
pub enum HeartbeatOutcome {
    Healthy,
    NoRespondSet,
    Down,
}

pub fn evaluate_heartbeat(
    now: i64,
    last_response: i64,
    t_nack_secs: i64,
    t_down_secs: i64,
) -> HeartbeatOutcome {
    let elapsed = now - last_response;
    if elapsed > t_down_secs {
        HeartbeatOutcome::Down
    } else if elapsed > t_nack_secs {
        HeartbeatOutcome::NoRespondSet
    } else {
        HeartbeatOutcome::Healthy
    }
}

/// Admin-initiated or scheduler-initiated base-state transition. Returns an
/// error if the transition is not in the table of §4.3.
pub fn transition(current: NodeState, target: NodeState) -> Result<NodeState, ClusterError> {
    use NodeState::*;
    let allowed = matches!(
        (current, target),
        (Unknown, Idle)
            | (Unknown, Down)
            | (Idle, Allocated)
            | (Idle, Down)
            | (Allocated, Mixed)
            | (Allocated, Completing)
            | (Completing, Idle)
            | (_, Down)
            | (Down, Idle)
    );
    if allowed {
        Ok(target)
    } else {
        Err(ClusterError::ValidationFail(format!(
            "illegal node state transition {current} -> {target}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::node::GresMap;

    fn config() -> NodeConfig {
        NodeConfig {
            name_pattern: "node".to_string(),
            cpus: 8,
            real_memory_mb: 16384,
            tmp_disk_mb: 0,
            cores: 8,
            sockets: 1,
            threads: 1,
            gres: GresMap::new(),
            features: Vec::new(),
        }
    }

    fn node() -> Node {
        Node::new(0, "node0", std::sync::Arc::new(config()))
    }

    #[test]
    fn registration_accepts_matching_specs() {
        let mut n = node();
        let outcome = register_node(&mut n, &config(), FastSchedule::ConfigOnly, 8, 16384, 8, 100).unwrap();
        assert_eq!(outcome, RegistrationOutcome::Accepted);
        assert_eq!(n.state, NodeState::Idle);
        assert!(!n.flags.contains(NodeFlags::DRAIN));
    }

    #[test]
    fn registration_drains_on_under_delivery() {
        let mut n = node();
        let outcome = register_node(&mut n, &config(), FastSchedule::ConfigOnly, 4, 8192, 4, 100).unwrap();
        assert_eq!(outcome, RegistrationOutcome::Drained);
        assert!(n.flags.contains(NodeFlags::DRAIN));
        assert_eq!(n.state, NodeState::Idle);
    }

    #[test]
    fn registration_trust_mode_never_drains() {
        let mut n = node();
        let outcome = register_node(&mut n, &config(), FastSchedule::Trust, 2, 1024, 2, 100).unwrap();
        assert_eq!(outcome, RegistrationOutcome::Accepted);
        assert_eq!(n.cpus, 2);
    }

    #[test]
    fn heartbeat_thresholds() {
        assert!(matches!(evaluate_heartbeat(100, 100, 30, 120), HeartbeatOutcome::Healthy));
        assert!(matches!(evaluate_heartbeat(140, 100, 30, 120), HeartbeatOutcome::NoRespondSet));
        assert!(matches!(evaluate_heartbeat(230, 100, 30, 120), HeartbeatOutcome::Down));
    }

    #[test]
    fn any_state_can_go_down() {
        assert_eq!(transition(NodeState::Mixed, NodeState::Down).unwrap(), NodeState::Down);
    }

    #[test]
    fn illegal_transition_rejected() {
        assert!(transition(NodeState::Idle, NodeState::Mixed).is_err());
    }
}
