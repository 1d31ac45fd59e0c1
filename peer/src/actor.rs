use std::pin::Pin;

use rand::Rng;
use tokio::{
    sync::{mpsc, oneshot},
    time::{self, Duration, Sleep},
};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    cli::{CliCommand, CliReply},
    config::Config,
    election,
    endpoint::{Endpoint, Epoch},
    heartbeat::{self, HeartbeatAction},
    index,
    registry::{peer_name, tracker_name, RegistryClient},
    rpc::{RpcClient, RpcRequest, RpcResponse, TrackerStatus},
    state::PeerState,
    watch,
};

/// Everything the RPC server and CLI task need to talk to the actor.
/// Cheap to clone: it's just an `mpsc::Sender`.
#[derive(Clone)]
pub struct ActorHandle(mpsc::Sender<Command>);

pub enum Command {
    Rpc(RpcRequest, oneshot::Sender<RpcResponse>),
    Cli(CliCommand, oneshot::Sender<CliReply>),
    VoteResult {
        epoch: Epoch,
        endpoint: Endpoint,
        granted: bool,
    },
    /// Raised by the RPC server when a chunk/size request misses locally
    /// (4.9); fire-and-forget, no reply expected.
    FileMissingLocally,
}

impl ActorHandle {
    pub async fn call_rpc(&self, request: RpcRequest) -> Option<RpcResponse> {
        let (tx, rx) = oneshot::channel();
        self.0.send(Command::Rpc(request, tx)).await.ok()?;
        rx.await.ok()
    }

    pub async fn call_cli(&self, command: CliCommand) -> Option<CliReply> {
        let (tx, rx) = oneshot::channel();
        self.0.send(Command::Cli(command, tx)).await.ok()?;
        rx.await.ok()
    }

    pub fn notify_file_missing(&self) {
        let _ = self.0.try_send(Command::FileMissingLocally);
    }
}

// `Sleep` is `!Unpin`, so a `&mut Sleep` cannot itself be awaited -- only a
// pinned one can. Boxing gives an owned, independently movable `Pin` without
// pinning the `Actor` struct itself.
async fn wait_opt(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(t) => t.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn wait_opt_interval(interval: &mut Option<time::Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Owns all mutable peer state (section 5, "shared-resource policy"). The
/// RPC server, CLI task and vote/heartbeat fan-out tasks never touch
/// `PeerState` directly -- they only exchange `Command`s over the channel.
pub struct Actor {
    state: PeerState,
    config: Config,
    registry: RegistryClient,
    self_handle: ActorHandle,

    failure_detector: Option<Pin<Box<Sleep>>>,
    election_deadline: Option<Pin<Box<Sleep>>>,
    heartbeat_tick: Option<time::Interval>,
}

pub fn spawn(config: Config, registry: RegistryClient) -> (ActorHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(256);
    let handle = ActorHandle(tx);
    let actor = Actor {
        state: PeerState::new(
            Endpoint::from(config.listen_address),
            config.peer_id.clone(),
        ),
        config,
        registry,
        self_handle: handle.clone(),
        failure_detector: None,
        election_deadline: None,
        heartbeat_tick: None,
    };
    let peer_id = actor.state.peer_id.clone();
    let endpoint = actor.state.self_endpoint.clone();
    let span = info_span!("peer", peer_id = %peer_id, endpoint = %endpoint);
    let join = tokio::spawn(actor.run(rx).instrument(span));
    (handle, join)
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        if let Err(e) = self.startup().await {
            tracing::error!(error = %e, "startup failed, aborting");
            return;
        }

        let mut file_watch = time::interval(self.config.file_watch_interval);
        file_watch.tick().await; // first tick fires immediately; skip it

        loop {
            tokio::select! {
                maybe_cmd = commands.recv() => {
                    match maybe_cmd {
                        Some(Command::Cli(CliCommand::Quit, reply)) => {
                            let _ = reply.send(CliReply::Ack);
                            self.shutdown().await;
                            return;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => return,
                    }
                }
                _ = wait_opt(&mut self.failure_detector) => self.on_failure_detector_expiry().await,
                _ = wait_opt(&mut self.election_deadline) => self.on_election_deadline().await,
                _ = wait_opt_interval(&mut self.heartbeat_tick) => self.on_heartbeat_tick(),
                _ = file_watch.tick() => self.on_file_watch_tick().await,
            }
        }
    }

    async fn shutdown(&mut self) {
        info!("shutting down");
        self.heartbeat_tick = None;
        self.failure_detector = None;
        self.election_deadline = None;
        if self.state.is_tracker {
            let _ = self
                .registry
                .unregister(&tracker_name(self.state.known_tracker_epoch))
                .await;
        }
        let _ = self.registry.unregister(&peer_name(&self.state.peer_id)).await;
    }

    // ---- 4.1 startup and tracker discovery -----------------------------

    async fn startup(&mut self) -> Result<(), crate::registry::RegistryError> {
        self.registry
            .register(&peer_name(&self.state.peer_id), &self.state.self_endpoint)
            .await?;

        let startup_delay = if self.config.bootstrap {
            Duration::from_millis(rand::thread_rng().gen_range(0..50))
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(50..250))
        };
        time::sleep(startup_delay).await;

        for e in (0..=self.config.max_epoch_search).rev() {
            let Some(candidate) = self.registry.lookup(&tracker_name(e)).await.unwrap_or(None)
            else {
                continue;
            };
            match RpcClient::ping(&candidate, self.config.ping_timeout).await {
                Ok(true) => {
                    info!(tracker = %candidate, epoch = e, "discovered live tracker");
                    self.connect_to_tracker(candidate, e).await;
                    return Ok(());
                }
                _ => {
                    warn!(tracker = %candidate, epoch = e, "stale tracker name, unregistering");
                    let _ = self.registry.unregister(&tracker_name(e)).await;
                }
            }
        }

        if self.config.bootstrap && self.state.known_tracker_epoch == 0 {
            if self.registry.lookup(&tracker_name(1)).await?.is_none() {
                info!("no tracker discovered, self-appointing as bootstrap");
                self.become_tracker(1).await;
                return Ok(());
            }
        }

        info!("no tracker discovered, initiating election");
        self.initiate_election().await;
        Ok(())
    }

    async fn connect_to_tracker(&mut self, endpoint: Endpoint, epoch: Epoch) {
        self.state.known_tracker_endpoint = Some(endpoint.clone());
        self.state.known_tracker_epoch = epoch;
        if self.state.candidate_active && self.state.candidate_epoch <= epoch {
            self.state.clear_candidacy();
            self.election_deadline = None;
        }
        self.arm_failure_detector();

        let files: Vec<String> = self.state.local_files.iter().cloned().collect();
        self.submit_registration(files, false).await;
    }

    fn arm_failure_detector(&mut self) {
        let dur = rand::thread_rng().gen_range(
            self.config.detection_timeout_min..=self.config.detection_timeout_max,
        );
        self.failure_detector = Some(Box::pin(time::sleep(dur)));
    }

    // ---- 4.2 failure detector --------------------------------------------

    async fn on_failure_detector_expiry(&mut self) {
        warn!(
            tracker = ?self.state.known_tracker_endpoint,
            "failure detector expired"
        );
        self.state.known_tracker_endpoint = None;
        self.failure_detector = None;
        self.initiate_election().await;
    }

    // ---- 4.3 election engine ---------------------------------------------

    async fn initiate_election(&mut self) {
        let Some(epoch) = election::initiate_election(&mut self.state) else {
            return;
        };
        info!(epoch, "initiating election");

        let peers = match self.registry.peer_directory(&self.state.peer_id).await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(error = %e, "could not list peer directory for vote fan-out");
                Vec::new()
            }
        };

        let self_endpoint = self.state.self_endpoint.clone();
        let timeout = self.config.vote_timeout;
        for peer in peers {
            let handle = self.self_handle.clone();
            let candidate = self_endpoint.clone();
            tokio::spawn(async move {
                match RpcClient::request_vote(&peer, candidate, epoch, timeout).await {
                    Ok(granted) => {
                        let _ = handle
                            .0
                            .send(Command::VoteResult {
                                epoch,
                                endpoint: peer,
                                granted,
                            })
                            .await;
                    }
                    Err(e) => {
                        debug!(peer = %peer, error = %e, "vote request failed");
                    }
                }
            });
        }

        self.election_deadline = Some(Box::pin(time::sleep(self.config.election_request_timeout)));
    }

    async fn on_election_deadline(&mut self) {
        let epoch = self.state.candidate_epoch;
        let voters = self
            .state
            .votes_received
            .get(&epoch)
            .cloned()
            .unwrap_or_default();
        self.election_deadline = None;

        if election::has_quorum(&voters, self.config.quorum()) {
            info!(epoch, votes = voters.len(), "won election");
            self.become_tracker(epoch).await;
        } else {
            debug!(epoch, votes = voters.len(), "election deadline without quorum");
            self.state.votes_received.remove(&epoch);
            self.state.candidate_active = false;
        }
    }

    fn on_vote_result(&mut self, epoch: Epoch, endpoint: Endpoint, granted: bool) {
        if !granted || !self.state.candidate_active || self.state.candidate_epoch != epoch {
            return;
        }
        self.state.votes_received.entry(epoch).or_default().insert(endpoint);
    }

    // ---- 4.4 / 4.5 becoming tracker and stepping down ---------------------

    async fn become_tracker(&mut self, epoch: Epoch) {
        let name = tracker_name(epoch);
        if let Ok(Some(stale)) = self.registry.lookup(&name).await {
            if stale != self.state.self_endpoint {
                let _ = self.registry.unregister(&name).await;
            }
        }
        if let Err(e) = self.registry.register(&name, &self.state.self_endpoint).await {
            warn!(error = %e, epoch, "failed to register as tracker, stepping down");
            self.step_down().await;
            if let Err(e) = self.startup().await {
                tracing::error!(error = %e, "rediscovery after failed tracker registration failed");
            }
            return;
        }

        self.state.become_tracker(epoch);
        self.failure_detector = None;
        self.heartbeat_tick = Some(time::interval(self.config.heartbeat_interval));

        let files: Vec<_> = self.state.local_files.iter().cloned().collect();
        let peer_id = self.state.peer_id.clone();
        let self_endpoint = self.state.self_endpoint.clone();
        index::register_files(&mut self.state, peer_id, self_endpoint, files, epoch, false);

        info!(epoch, "became tracker");
    }

    /// Used outside heartbeat reconciliation, where `PeerState` has not yet
    /// been mutated: derives whether there is a self-registered tracker name
    /// to clean up from the still-current state, then clears it (4.5).
    async fn step_down(&mut self) {
        let epoch = self.state.known_tracker_epoch;
        if self.state.known_tracker_endpoint.as_ref() == Some(&self.state.self_endpoint) {
            let _ = self.registry.unregister(&tracker_name(epoch)).await;
        }
        self.state.step_down();
        self.heartbeat_tick = None;
        info!(epoch, "stepped down");
    }

    /// Unregisters `TRACKER_EPOCH_<epoch>` for a step-down whose `PeerState`
    /// mutation already happened inside `heartbeat::reconcile` -- by the time
    /// the actor sees the `HeartbeatAction`, `known_tracker_endpoint` has
    /// already been cleared, so the epoch to clean up must be captured by
    /// the caller *before* `reconcile` ran rather than re-derived here.
    async fn unregister_own_tracker_name(&mut self, epoch: Epoch) {
        let _ = self.registry.unregister(&tracker_name(epoch)).await;
        self.heartbeat_tick = None;
        info!(epoch, "stepped down");
    }

    // ---- 4.6 heartbeat emitter and reconciliation -------------------------

    fn on_heartbeat_tick(&mut self) {
        let peers_fut = {
            let registry_base = self.registry.clone();
            let peer_id = self.state.peer_id.clone();
            let self_endpoint = self.state.self_endpoint.clone();
            let epoch = self.state.known_tracker_epoch;
            let timeout = self.config.heartbeat_rpc_timeout;
            async move {
                let peers = match registry_base.peer_directory(&peer_id).await {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "could not list peer directory for heartbeat fan-out");
                        return;
                    }
                };
                for peer in peers {
                    let endpoint = self_endpoint.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            RpcClient::receive_heartbeat(&peer, endpoint, epoch, timeout).await
                        {
                            debug!(peer = %peer, error = %e, "heartbeat delivery failed");
                        }
                    });
                }
            }
        };
        tokio::spawn(peers_fut);
    }

    async fn apply_heartbeat_action(
        &mut self,
        action: HeartbeatAction,
        heartbeat_endpoint: Endpoint,
        heartbeat_epoch: Epoch,
        was_tracker_epoch: Option<Epoch>,
    ) {
        match action {
            // A stale or self-echoed heartbeat: no state changed, nothing to
            // rearm (4.6's "Ignore" rows never reset the detector).
            HeartbeatAction::Ignore => {}
            // The already-accepted tracker re-asserting itself, or a
            // higher-endpoint same-epoch tracker losing the tie: the
            // accepted tracker is still live, so the detector is reset.
            HeartbeatAction::ResetDetectorOnly => {
                self.arm_failure_detector();
            }
            HeartbeatAction::StepDown => {
                if let Some(epoch) = was_tracker_epoch {
                    self.unregister_own_tracker_name(epoch).await;
                }
            }
            HeartbeatAction::StepDownThenDiscover => {
                if let Some(epoch) = was_tracker_epoch {
                    self.unregister_own_tracker_name(epoch).await;
                }
                if let Err(e) = self.startup().await {
                    tracing::error!(error = %e, "rediscovery after step-down failed");
                }
            }
            HeartbeatAction::Connect | HeartbeatAction::Switch => {
                let _ = heartbeat_endpoint;
                if self.state.candidate_active && self.state.candidate_epoch <= heartbeat_epoch {
                    self.state.clear_candidacy();
                    self.election_deadline = None;
                }
                self.arm_failure_detector();
                let files: Vec<_> = self.state.local_files.iter().cloned().collect();
                self.submit_registration(files, false).await;
            }
        }
    }

    // ---- 4.7 file index (tracker side) -------------------------------------

    async fn handle_rpc(&mut self, request: RpcRequest) -> RpcResponse {
        match request {
            RpcRequest::Ping => RpcResponse::Pong,

            RpcRequest::RequestVote {
                candidate_endpoint,
                election_epoch,
            } => {
                let outcome =
                    election::evaluate_vote_request(&mut self.state, &candidate_endpoint, election_epoch);
                if outcome.cancel_own_candidacy {
                    self.election_deadline = None;
                }
                if outcome.stop_failure_detector {
                    self.failure_detector = None;
                }
                RpcResponse::VoteGranted(outcome.granted)
            }

            RpcRequest::ReceiveHeartbeat {
                tracker_endpoint,
                tracker_epoch,
            } => {
                let was_tracker_epoch = self.state.is_tracker.then_some(self.state.known_tracker_epoch);
                let action = heartbeat::reconcile(&mut self.state, &tracker_endpoint, tracker_epoch);
                self.apply_heartbeat_action(action, tracker_endpoint, tracker_epoch, was_tracker_epoch)
                    .await;
                RpcResponse::Ack
            }

            RpcRequest::RegisterFiles {
                peer_id,
                endpoint,
                files,
                peer_epoch,
                incremental,
            } => {
                let status =
                    index::register_files(&mut self.state, peer_id, endpoint, files, peer_epoch, incremental);
                RpcResponse::RegisterFiles(status)
            }

            RpcRequest::QueryFile { name, peer_epoch } => {
                RpcResponse::QueryFile(index::query_file(&self.state, &name, peer_epoch))
            }

            RpcRequest::ListIndex { peer_epoch } => {
                RpcResponse::ListIndex(index::list_index(&self.state, peer_epoch))
            }

            // Served directly by the RPC server task against the
            // filesystem (section 5); the actor never sees these.
            RpcRequest::RequestFileChunk { .. } | RpcRequest::GetFileSize { .. } => {
                unreachable!("file reads are handled by the RPC server, not routed to the actor")
            }
        }
    }

    /// Common handling for every epoch-gated tracker response (4.7: "the
    /// client-side helper that interprets not_tracker / epoch_too_low
    /// updates its own epoch view upward ... and triggers rediscovery --
    /// the index is never accepted from an obsolete view"). Shared by
    /// `register_files`, `query_file` and `list_index` call sites so none of
    /// them silently accepts a response from a tracker view we've already
    /// moved past. Returns the payload on `Ok`, `None` otherwise.
    async fn adopt_tracker_status<T>(&mut self, status: TrackerStatus<T>) -> Option<T> {
        match status {
            TrackerStatus::Ok(payload) => Some(payload),
            TrackerStatus::NotTracker {
                known_tracker_endpoint,
                known_tracker_epoch,
            } => {
                if known_tracker_epoch > self.state.known_tracker_epoch {
                    self.state.known_tracker_epoch = known_tracker_epoch;
                    self.state.known_tracker_endpoint = known_tracker_endpoint;
                }
                self.failure_detector = None;
                if let Err(e) = self.startup().await {
                    tracing::error!(error = %e, "rediscovery after not_tracker failed");
                }
                None
            }
            TrackerStatus::EpochTooLow { current_epoch } => {
                self.state.known_tracker_epoch = current_epoch.saturating_sub(1);
                self.failure_detector = None;
                if let Err(e) = self.startup().await {
                    tracing::error!(error = %e, "rediscovery after epoch_too_low failed");
                }
                None
            }
        }
    }

    /// `register_files` as seen from this peer's own point of view: if self
    /// is tracker, update the index directly; otherwise call the known
    /// tracker over RPC and adopt whatever epoch view it reports back
    /// (4.7, "the index is never accepted from an obsolete view").
    async fn submit_registration(&mut self, files: Vec<String>, incremental: bool) {
        if self.state.is_tracker {
            let peer_id = self.state.peer_id.clone();
            let self_endpoint = self.state.self_endpoint.clone();
            let epoch = self.state.known_tracker_epoch;
            index::register_files(&mut self.state, peer_id, self_endpoint, files, epoch, incremental);
            return;
        }

        let Some(tracker) = self.state.known_tracker_endpoint.clone() else {
            return;
        };
        let request = RpcRequest::RegisterFiles {
            peer_id: self.state.peer_id.clone(),
            endpoint: self.state.self_endpoint.clone(),
            files: files.into_iter().collect(),
            peer_epoch: self.state.known_tracker_epoch,
            incremental,
        };
        match RpcClient::register_files(&tracker, request, self.config.register_timeout).await {
            Ok(status) => {
                self.adopt_tracker_status(status).await;
            }
            Err(e) => {
                warn!(error = %e, "register_files failed, treating tracker as dead");
                self.state.known_tracker_endpoint = None;
                self.failure_detector = None;
                self.initiate_election().await;
            }
        }
    }

    // ---- 4.8 local file watch ----------------------------------------------

    async fn on_file_watch_tick(&mut self) {
        self.rescan_and_report().await;
    }

    async fn rescan_and_report(&mut self) {
        let diff = match watch::rescan(&self.config.shared_dir, &self.state.local_files).await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "shared directory rescan failed");
                return;
            }
        };
        if diff.added.is_empty() && diff.removed.is_empty() {
            return;
        }

        let full_sweep = diff.needs_full_sweep() || self.state.is_tracker;
        self.state.local_files = diff.current.clone();
        let files: Vec<String> = if full_sweep {
            diff.current.into_iter().collect()
        } else {
            diff.added.into_iter().collect()
        };
        self.submit_registration(files, !full_sweep).await;
    }

    // ---- command dispatch ---------------------------------------------------

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Rpc(request, reply) => {
                let response = self.handle_rpc(request).await;
                let _ = reply.send(response);
            }
            Command::Cli(cmd, reply) => {
                let response = self.handle_cli(cmd).await;
                let _ = reply.send(response);
            }
            Command::VoteResult {
                epoch,
                endpoint,
                granted,
            } => self.on_vote_result(epoch, endpoint, granted),
            Command::FileMissingLocally => self.rescan_and_report().await,
        }
    }

    async fn handle_cli(&mut self, command: CliCommand) -> CliReply {
        match command {
            CliCommand::Search(name) => {
                if self.state.is_tracker {
                    match index::query_file(&self.state, &name, self.state.known_tracker_epoch) {
                        TrackerStatus::Ok(holders) => CliReply::Holders(holders),
                        _ => CliReply::Error("unexpected tracker status".into()),
                    }
                } else if let Some(tracker) = self.state.known_tracker_endpoint.clone() {
                    match RpcClient::query_file(
                        &tracker,
                        name,
                        self.state.known_tracker_epoch,
                        self.config.register_timeout,
                    )
                    .await
                    {
                        Ok(status) => match self.adopt_tracker_status(status).await {
                            Some(holders) => CliReply::Holders(holders),
                            None => CliReply::Error("tracker view is stale, rediscovering".into()),
                        },
                        Err(e) => CliReply::Error(e.to_string()),
                    }
                } else {
                    CliReply::Error("no known tracker".into())
                }
            }

            CliCommand::ListMy => CliReply::Files(self.state.local_files.clone()),

            CliCommand::ListNet => {
                if self.state.is_tracker {
                    match index::list_index(&self.state, self.state.known_tracker_epoch) {
                        TrackerStatus::Ok(index) => CliReply::Index(index),
                        _ => CliReply::Error("unexpected tracker status".into()),
                    }
                } else if let Some(tracker) = self.state.known_tracker_endpoint.clone() {
                    match RpcClient::list_index(
                        &tracker,
                        self.state.known_tracker_epoch,
                        self.config.register_timeout,
                    )
                    .await
                    {
                        Ok(status) => match self.adopt_tracker_status(status).await {
                            Some(index) => CliReply::Index(index),
                            None => CliReply::Error("tracker view is stale, rediscovering".into()),
                        },
                        Err(e) => CliReply::Error(e.to_string()),
                    }
                } else {
                    CliReply::Error("no known tracker".into())
                }
            }

            CliCommand::Refresh => {
                self.rescan_and_report().await;
                CliReply::Ack
            }

            CliCommand::Status => CliReply::Status {
                is_tracker: self.state.is_tracker,
                known_tracker_epoch: self.state.known_tracker_epoch,
                known_tracker_endpoint: self.state.known_tracker_endpoint.clone(),
            },

            CliCommand::Election => {
                self.failure_detector = None;
                self.initiate_election().await;
                CliReply::Ack
            }

            CliCommand::Quit => unreachable!("handled in the run loop before dispatch"),
        }
    }
}
