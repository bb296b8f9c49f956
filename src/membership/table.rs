//! Member table backing the gossip and cluster-status hooks.
//!
//! Failure detection and dissemination loops live outside this crate; the
//! table only stores what it is told and resolves conflicting reports by
//! incarnation number.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

use super::types::{Member, NodeId, NodeState};

pub struct MembershipTable {
    pub local: Member,
    members: DashMap<NodeId, Member>,
}

impl MembershipTable {
    pub fn new(local: Member) -> Arc<Self> {
        let members = DashMap::new();
        members.insert(local.id.clone(), local.clone());
        Arc::new(Self { local, members })
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local.id
    }

    pub fn get(&self, id: &NodeId) -> Option<Member> {
        self.members.get(id).map(|entry| entry.value().clone())
    }

    /// All known members, sorted by id.
    pub fn members(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self
            .members
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        members
    }

    pub fn alive_members(&self) -> Vec<Member> {
        self.members()
            .into_iter()
            .filter(|member| member.state == NodeState::Alive)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Merges a report about `incoming` into the table.
    ///
    /// Returns true when the table changed. Reports about the local node
    /// are ignored; the local node is the only authority on itself.
    pub fn merge(&self, incoming: Member) -> bool {
        if incoming.id == self.local.id {
            return false;
        }

        match self.members.get_mut(&incoming.id) {
            Some(mut existing) => {
                if incoming.incarnation > existing.incarnation {
                    tracing::debug!(
                        "Updating {}: inc {} -> {} ({:?})",
                        incoming.id,
                        existing.incarnation,
                        incoming.incarnation,
                        incoming.state
                    );
                    existing.state = incoming.state;
                    existing.incarnation = incoming.incarnation;
                    existing.addr = incoming.addr;
                    existing.last_seen = Some(Instant::now());
                    true
                } else if incoming.incarnation == existing.incarnation
                    && incoming.state == NodeState::Alive
                    && existing.state == NodeState::Suspect
                {
                    tracing::info!("{} refuted suspicion", incoming.id);
                    existing.state = NodeState::Alive;
                    existing.last_seen = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
            None => {
                tracing::info!("Discovered new member: {} at {}", incoming.id, incoming.addr);
                let mut member = incoming;
                member.last_seen = Some(Instant::now());
                self.members.insert(member.id.clone(), member);
                true
            }
        }
    }

    /// Merges every member of a batch, returning how many changed the table.
    pub fn merge_all(&self, members: impl IntoIterator<Item = Member>) -> usize {
        members
            .into_iter()
            .filter(|member| self.merge(member.clone()))
            .count()
    }
}
