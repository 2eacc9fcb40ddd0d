//! Demo binary wiring the `raknet` core into a bevy app as a pair of
//! thin `Plugin`s (spec §1: "public server/client shells ... excluded
//! except where the core produces or consumes their data" — this binary
//! is exactly that excluded shell, kept minimal on purpose).

use bevy::prelude::*;
use bevy::time::common_conditions::on_timer;
use log::{info, LevelFilter};
use raknet::endpoint::{
    check_timeout, client_read_udp, connect, connection_tick, flush_batch, flush_receipts,
    server_read_udp, ServerBundle,
};
use raknet::events::{HandlePing, OnConnect, OnDisconnect, OnLogin, OnMessage};
use raknet::RakNetConfig;

/// Tick period driving socket reads and peer maintenance (spec §4.6:
/// "the tick period is ≤ 10 ms").
const TICK_PERIOD: std::time::Duration = std::time::Duration::from_millis(10);

pub struct RakNetServer {
    addr: String,
    config: RakNetConfig,
}

impl RakNetServer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            config: RakNetConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RakNetConfig) -> Self {
        self.config = config;
        self
    }
}

impl Plugin for RakNetServer {
    fn build(&self, app: &mut App) {
        app.add_event::<OnConnect>()
            .add_event::<OnLogin>()
            .add_event::<OnDisconnect>()
            .add_event::<OnMessage>()
            .add_event::<raknet::events::OnAcknowledge>()
            .add_event::<raknet::events::OnNotAcknowledge>()
            .add_event::<raknet::events::OnLatency>()
            .add_event::<raknet::events::OnHandlerError>()
            .add_event::<raknet::events::OnPeerError>()
            .add_event::<HandlePing>();

        app.add_systems(PreUpdate, server_read_udp)
            .add_systems(PreUpdate, connection_tick)
            .add_systems(PreUpdate, flush_batch.run_if(on_timer(TICK_PERIOD)))
            .add_systems(PreUpdate, flush_receipts.run_if(on_timer(TICK_PERIOD)))
            .add_systems(
                PreUpdate,
                check_timeout.run_if(on_timer(std::time::Duration::from_secs(1))),
            )
            .add_systems(Update, raknet::sink::bridge_events);

        let mut config = self.config.clone();
        config.bind_address = Some(self.addr.clone());

        let bundle = ServerBundle::bind(config).expect("bind raknet server socket");
        app.world.spawn(bundle);
    }
}

pub struct RakNetClient {
    remote: String,
    config: RakNetConfig,
}

impl RakNetClient {
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            config: RakNetConfig::default(),
        }
    }
}

impl Plugin for RakNetClient {
    fn build(&self, app: &mut App) {
        app.add_event::<OnConnect>()
            .add_event::<OnLogin>()
            .add_event::<OnDisconnect>()
            .add_event::<OnMessage>()
            .add_event::<raknet::events::OnAcknowledge>()
            .add_event::<raknet::events::OnNotAcknowledge>()
            .add_event::<raknet::events::OnLatency>()
            .add_event::<raknet::events::OnHandlerError>()
            .add_event::<raknet::events::OnPeerError>()
            .add_event::<HandlePing>();

        app.add_systems(PreUpdate, client_read_udp)
            .add_systems(PreUpdate, connection_tick)
            .add_systems(PreUpdate, flush_batch.run_if(on_timer(TICK_PERIOD)))
            .add_systems(PreUpdate, flush_receipts.run_if(on_timer(TICK_PERIOD)))
            .add_systems(Update, raknet::sink::bridge_events);

        let world: &mut World = &mut app.world;
        connect(world, self.config.clone(), &self.remote).expect("connect to raknet server");
    }
}

fn log_connects(mut on_connect: EventReader<OnConnect>, mut on_login: EventReader<OnLogin>) {
    for e in on_connect.read() {
        info!("peer connected: {}", e.address);
    }
    for e in on_login.read() {
        info!("peer logged in: {}", e.address);
    }
}

fn log_messages(mut on_message: EventReader<OnMessage>) {
    for e in on_message.read() {
        info!(
            "message on channel {}: {} bytes",
            e.channel.0,
            e.payload.len()
        );
    }
}

fn log_disconnects(mut on_disconnect: EventReader<OnDisconnect>) {
    for e in on_disconnect.read() {
        info!("peer {} disconnected: {:?}", e.address, e.reason);
    }
}

fn main() {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .init();

    let mut task_pool_options = TaskPoolOptions::default();
    task_pool_options.io.min_threads = 0;
    task_pool_options.io.max_threads = 0;
    task_pool_options.io.percent = 0.0;

    App::new()
        .add_plugins(MinimalPlugins.set(TaskPoolPlugin { task_pool_options }))
        .add_plugins(RakNetServer::new("0.0.0.0:19132"))
        .add_systems(Update, (log_connects, log_messages, log_disconnects))
        .run();
}
