//! Session Roster and Update Fan-Out
//!
//! The server hosts many sessions against one registry. The roster
//! tracks the live ones so host-side events (a resource changed, a
//! collection mutated) can fan out to every session that negotiated
//! the corresponding capability. Each session keeps its own
//! subscription set (owned by the session, cleared at close); the
//! roster only routes.

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use serde_json::json;
use tracing::{debug, trace};

// Layer 3: Internal module imports
use crate::protocol::constants::methods;
use crate::protocol::{ClientCapabilities, ServerCapabilities, Uri};
use crate::registry::PrimitiveKind;
use crate::session::{Peer, SessionState};

/// What the roster remembers about one live session
#[derive(Debug)]
pub(crate) struct SessionEntry {
    pub peer: Peer,
    /// Capabilities advertised to this session at initialize time
    pub advertised: std::sync::Mutex<Option<ServerCapabilities>>,
    /// Capabilities the client declared
    pub client: std::sync::Mutex<Option<ClientCapabilities>>,
}

/// Live sessions keyed by session id
#[derive(Debug, Default)]
pub(crate) struct SessionRoster {
    entries: DashMap<String, SessionEntry>,
}

impl SessionRoster {
    pub fn add(&self, peer: Peer) {
        self.entries.insert(
            peer.session_id().to_string(),
            SessionEntry {
                peer,
                advertised: std::sync::Mutex::new(None),
                client: std::sync::Mutex::new(None),
            },
        );
    }

    pub fn remove(&self, session_id: &str) {
        self.entries.remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.prune();
        self.entries.len()
    }

    /// Record what was negotiated with one session
    pub fn record_handshake(
        &self,
        session_id: &str,
        advertised: ServerCapabilities,
        client: ClientCapabilities,
    ) {
        if let Some(entry) = self.entries.get(session_id) {
            if let Ok(mut guard) = entry.advertised.lock() {
                *guard = Some(advertised);
            }
            if let Ok(mut guard) = entry.client.lock() {
                *guard = Some(client);
            }
        }
    }

    /// The capabilities a session's client declared
    pub fn client_capabilities(&self, session_id: &str) -> Option<ClientCapabilities> {
        let entry = self.entries.get(session_id)?;
        let guard = entry.client.lock().ok()?;
        guard.clone()
    }

    /// Tell every session subscribed to `uri` that it changed
    pub async fn notify_resource_updated(&self, uri: &Uri) {
        self.prune();
        let peers: Vec<Peer> = self
            .entries
            .iter()
            .filter(|entry| entry.peer.subscriptions().contains(uri))
            .map(|entry| entry.peer.clone())
            .collect();
        debug!(uri = %uri, sessions = peers.len(), "resource updated");
        for peer in peers {
            let _ = peer
                .notify(methods::RESOURCES_UPDATED, Some(json!({"uri": uri})))
                .await;
        }
    }

    /// Forward a collection change to every session that negotiated
    /// the matching list-changed capability
    pub async fn notify_list_changed(&self, kind: PrimitiveKind) {
        self.prune();
        let method = match kind {
            PrimitiveKind::Tool => methods::TOOLS_LIST_CHANGED,
            PrimitiveKind::Prompt => methods::PROMPTS_LIST_CHANGED,
            PrimitiveKind::Resource => methods::RESOURCES_LIST_CHANGED,
        };
        let peers: Vec<Peer> = self
            .entries
            .iter()
            .filter(|entry| {
                let guard = entry.advertised.lock().ok();
                let Some(advertised) = guard.as_ref().and_then(|g| g.as_ref()) else {
                    return false; // handshake not finished
                };
                match kind {
                    PrimitiveKind::Tool => advertised.tools_list_changed(),
                    PrimitiveKind::Prompt => advertised.prompts_list_changed(),
                    PrimitiveKind::Resource => advertised.resources_list_changed(),
                }
            })
            .map(|entry| entry.peer.clone())
            .collect();
        trace!(%kind, sessions = peers.len(), "collection changed");
        for peer in peers {
            let _ = peer.notify(method, None).await;
        }
    }

    /// Drop entries whose sessions have closed
    fn prune(&self) {
        self.entries.retain(|_, entry| {
            !matches!(
                entry.peer.state(),
                SessionState::Closing | SessionState::Closed
            )
        });
    }
}
