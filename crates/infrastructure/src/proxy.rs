use crate::dns::forwarding::UpstreamForwarder;
use crate::dns::listener::{bind_listeners, run_tcp_listener, run_udp_listener};
use crate::dns::server::DnsServerHandler;
use crate::dns::settings::ProxySettings;
use crate::dns::synthesizer::ResponseSynthesizer;
use crate::dns::transport::{DnsExchange, NetworkExchange};
use arc_swap::ArcSwap;
use intercept_dns_application::{DiscoveryRecorder, ThrottledLogger};
use intercept_dns_domain::{
    parse_listen_addr, Config, DiscoveredHost, DomainError, QueryClassifier, UpstreamAddr,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type ListenerHandle = JoinHandle<Result<(), DomainError>>;

/// Listener state. Only `start` and `shutdown` change it, under one lock.
#[derive(Default)]
struct ServerState {
    bind_address: Option<String>,
    local_addr: Option<SocketAddr>,
    udp: Option<ListenerHandle>,
    tcp: Option<ListenerHandle>,
    token: Option<CancellationToken>,
    fatal_rx: Option<mpsc::Receiver<DomainError>>,
}

impl ServerState {
    fn is_started(&self) -> bool {
        self.token.is_some()
    }

    fn listeners_live(&self) -> bool {
        let live = |handle: &Option<ListenerHandle>| {
            handle.as_ref().is_some_and(|h| !h.is_finished())
        };
        live(&self.udp) && live(&self.tcp)
    }
}

/// DNS discovery and interception proxy.
///
/// Owns the UDP and TCP listeners, the discovery registry and the runtime
/// settings. Stopped until `start`; can be started again after `shutdown`.
pub struct DnsProxy {
    handler: Arc<DnsServerHandler>,
    recorder: Arc<DiscoveryRecorder>,
    settings: Arc<ArcSwap<ProxySettings>>,
    tcp_idle_timeout: Duration,
    state: Mutex<ServerState>,
}

impl DnsProxy {
    pub fn new(config: Config) -> Result<Self, DomainError> {
        Self::with_exchange(config, Arc::new(NetworkExchange))
    }

    /// Builds a proxy that talks to upstreams through `exchange`.
    pub fn with_exchange(
        config: Config,
        exchange: Arc<dyn DnsExchange>,
    ) -> Result<Self, DomainError> {
        let settings = Arc::new(ArcSwap::from_pointee(ProxySettings::from_config(&config)?));
        let throttle = Arc::new(ThrottledLogger::from_config(&config.logging));
        let recorder = Arc::new(
            DiscoveryRecorder::new(config.discovery.clone()).with_throttle(Arc::clone(&throttle)),
        );

        let synthesizer = ResponseSynthesizer::new(config.intercept.ttl_secs);
        let forwarder = UpstreamForwarder::new(
            exchange,
            synthesizer,
            throttle,
            Duration::from_millis(config.upstream.timeout_ms),
        );
        let handler = Arc::new(DnsServerHandler::new(
            QueryClassifier::from_config(&config.intercept),
            synthesizer,
            forwarder,
            Arc::clone(&recorder),
            Arc::clone(&settings),
        ));

        info!(
            upstream = ?config.upstream.address,
            intercept_target = %config.intercept.target_ip,
            intercept_domains = ?config.intercept.domains,
            match_mode = config.intercept.match_mode.as_str(),
            "DNS proxy configured"
        );

        Ok(Self {
            handler,
            recorder,
            settings,
            tcp_idle_timeout: Duration::from_secs(config.server.tcp_idle_timeout_secs),
            state: Mutex::new(ServerState::default()),
        })
    }

    /// Binds UDP and TCP on `addr` and starts serving in the background.
    ///
    /// `addr` is `host:port` or `:port`. Bind failures are returned here and
    /// leave nothing running.
    pub async fn start(&self, addr: &str) -> Result<(), DomainError> {
        let socket_addr = parse_listen_addr(addr)?;
        let mut state = self.state.lock().await;

        if state.is_started() {
            return Err(DomainError::AlreadyRunning(
                state.bind_address.clone().unwrap_or_default(),
            ));
        }

        let (udp, tcp) = bind_listeners(socket_addr)?;
        let local_addr = udp.local_addr().map_err(|e| DomainError::Bind {
            protocol: "UDP",
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

        let bind_address = addr.to_string();
        self.settings.rcu(|current| {
            ProxySettings::clone(current)
                .with_listener(Some(bind_address.clone()), Some(local_addr))
        });

        let token = CancellationToken::new();
        let (fatal_tx, fatal_rx) = mpsc::channel(2);

        let udp_handle = {
            let handler = Arc::clone(&self.handler);
            let token = token.clone();
            let fatal_tx = fatal_tx.clone();
            tokio::spawn(async move {
                let result = run_udp_listener(udp, handler, token).await;
                report_fatal(&fatal_tx, &result).await;
                result
            })
        };

        let tcp_handle = {
            let handler = Arc::clone(&self.handler);
            let token = token.clone();
            let idle_timeout = self.tcp_idle_timeout;
            tokio::spawn(async move {
                let result = run_tcp_listener(tcp, handler, idle_timeout, token).await;
                report_fatal(&fatal_tx, &result).await;
                result
            })
        };

        *state = ServerState {
            bind_address: Some(bind_address),
            local_addr: Some(local_addr),
            udp: Some(udp_handle),
            tcp: Some(tcp_handle),
            token: Some(token),
            fatal_rx: Some(fatal_rx),
        };

        info!(bind_address = %addr, local_addr = %local_addr, "DNS proxy started");
        Ok(())
    }

    /// Starts on `addr` and waits until the listeners stop.
    ///
    /// Returns the first fatal listener error, or `Ok` once `shutdown` has
    /// stopped both loops.
    pub async fn serve(&self, addr: &str) -> Result<(), DomainError> {
        self.start(addr).await?;

        let fatal_rx = self.state.lock().await.fatal_rx.take();
        let Some(mut fatal_rx) = fatal_rx else {
            return Ok(());
        };

        match fatal_rx.recv().await {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stops accepting on both transports and waits for the loops to exit.
    ///
    /// Queries already being answered run to completion. Safe to call when
    /// not running.
    pub async fn shutdown(&self) -> Result<(), DomainError> {
        let mut state = self.state.lock().await;

        let Some(token) = state.token.take() else {
            debug!("Shutdown requested while not running");
            return Ok(());
        };
        token.cancel();

        for (protocol, handle) in [("UDP", state.udp.take()), ("TCP", state.tcp.take())] {
            let Some(handle) = handle else { continue };
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(protocol, error = %e, "Listener had already failed"),
                Err(e) => warn!(protocol, error = %e, "Listener task did not exit cleanly"),
            }
        }

        let bind_address = state.bind_address.take();
        let local_addr = state.local_addr.take();
        *state = ServerState::default();
        self.settings
            .rcu(|current| ProxySettings::clone(current).with_listener(None, None));

        info!(
            bind_address = ?bind_address,
            local_addr = ?local_addr,
            "DNS proxy stopped"
        );
        Ok(())
    }

    /// True when both listeners are alive and were started on exactly `addr`.
    pub async fn is_running(&self, addr: &str) -> bool {
        let state = self.state.lock().await;
        state.is_started()
            && state.bind_address.as_deref() == Some(addr)
            && state.listeners_live()
    }

    /// Socket address the listeners are bound to, if started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.settings.load().local_addr
    }

    /// Replaces the upstream resolver; `None` makes every forward fail closed.
    pub fn set_upstream(&self, upstream: Option<&str>) -> Result<(), DomainError> {
        let upstream = upstream.map(UpstreamAddr::parse).transpose()?;
        info!(upstream = ?upstream.as_ref().map(ToString::to_string), "Upstream updated");

        self.settings.rcu(|current| ProxySettings {
            upstream: upstream.clone(),
            ..ProxySettings::clone(current)
        });
        Ok(())
    }

    pub fn upstream(&self) -> Option<UpstreamAddr> {
        self.settings.load().upstream.clone()
    }

    pub fn set_intercept_target(&self, target: Ipv4Addr) {
        info!(intercept_target = %target, "Intercept target updated");
        self.settings.rcu(|current| ProxySettings {
            intercept_target: target,
            ..ProxySettings::clone(current)
        });
    }

    pub fn intercept_target(&self) -> Ipv4Addr {
        self.settings.load().intercept_target
    }

    /// Registers the function run once for every newly discovered hostname.
    pub fn set_discovery_callback<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.recorder.set_callback(Arc::new(callback));
    }

    pub fn discovered_hosts(&self) -> Vec<DiscoveredHost> {
        self.recorder.hosts()
    }

    pub fn known_service_hosts(&self) -> Vec<DiscoveredHost> {
        self.recorder.known_service_hosts()
    }
}

impl Drop for DnsProxy {
    fn drop(&mut self) {
        if let Some(token) = self.state.get_mut().token.take() {
            token.cancel();
        }
    }
}

async fn report_fatal(fatal_tx: &mpsc::Sender<DomainError>, result: &Result<(), DomainError>) {
    if let Err(e) = result {
        error!(error = %e, "DNS listener stopped with a fatal error");
        let _ = fatal_tx.send(e.clone()).await;
    }
}
