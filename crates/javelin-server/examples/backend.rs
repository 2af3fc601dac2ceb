//! Minimal embedding host: accepts every forwarded player, sends a Join Game
//! packet once the login reply has flushed, and logs what happens.
//!
//! Run behind a Velocity proxy with modern forwarding:
//!
//! ```text
//! JAVELIN_FORWARDING_SECRET=... RUST_LOG=debug cargo run --example backend
//! ```

use javelin_proto::play::JoinGame;
use javelin_server::{ConnId, ForwardedIdentity, HostHandler, Server, ServerConfig, ServerError};
use tracing::{info, warn};

// An empty NBT compound; a real backend sends its full registry codec.
const REGISTRY_CODEC: &[u8] = &[0x0A, 0x00, 0x00];

#[derive(Default)]
struct Backend {
    next_id: u32,
    /// Connections whose Login Success has flushed and still need Join Game.
    ready: Vec<(ConnId, u32)>,
    spawned: Vec<u32>,
}

impl HostHandler for Backend {
    type Player = u32;

    fn on_login(&mut self, conn: ConnId, identity: &ForwardedIdentity<'_>) -> Option<u32> {
        let id = self.next_id;
        self.next_id += 1;
        info!(
            ?conn,
            player = id,
            name = identity.name,
            address = identity.address,
            properties = identity.properties.len(),
            "login verified"
        );
        Some(id)
    }

    fn on_join(&mut self, conn: ConnId, player: u32) {
        info!(?conn, player, "player joined");
    }

    fn on_write_finish(&mut self, conn: ConnId, player: u32) {
        if !self.spawned.contains(&player) {
            self.spawned.push(player);
            self.ready.push((conn, player));
        }
    }

    fn on_play_packet(&mut self, _conn: ConnId, player: u32, body: &[u8]) -> bool {
        info!(player, len = body.len(), "play packet");
        true
    }
}

fn join_game(player: u32) -> JoinGame<'static> {
    JoinGame {
        entity_id: player as i32,
        hardcore: false,
        gamemode: 0,
        prev_gamemode: -1,
        dimension_names: &["minecraft:overworld"],
        registry_codec: REGISTRY_CODEC,
        dimension_type: "minecraft:overworld",
        dimension_name: "minecraft:overworld",
        seed_hash: 0,
        max_players: 20,
        view_distance: 10,
        sim_distance: 10,
        reduced_debug_info: false,
        show_respawn_screen: true,
        debug_world: false,
        flat_world: true,
        death_location: None,
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let forwarding_secret = std::env::var("JAVELIN_FORWARDING_SECRET")
        .unwrap_or_else(|_| "your-forwarding-secret".into());
    let config = ServerConfig {
        port: 25566,
        forwarding_secret,
        ..ServerConfig::default()
    };

    let mut server = match Server::bind(config, Backend::default()) {
        Ok(server) => server,
        Err(err) => {
            match &err {
                ServerError::AddressInUse => eprintln!("bind: address already in use"),
                ServerError::ResourceLimited(_) => eprintln!("startup hit a resource limit: {err}"),
                ServerError::Unsupported(_) => {
                    eprintln!("this kernel cannot run the io_uring backend: {err}")
                }
                ServerError::Unknown(_) => eprintln!("startup failed: {err}"),
            }
            std::process::exit(1);
        }
    };
    if let Err(err) = server.listen() {
        eprintln!("listen failed: {err}");
        std::process::exit(1);
    }
    info!("listening on 0.0.0.0:25566");

    loop {
        if let Err(err) = server.poll() {
            warn!(%err, "poll failed");
            std::process::exit(1);
        }
        // Join Game goes out once the login reply has fully flushed.
        let ready = std::mem::take(&mut server.host_mut().ready);
        for (conn, player) in ready {
            match join_game(player).encode() {
                Ok(packet) => server.write(conn, packet),
                Err(err) => warn!(player, %err, "join game encoding failed"),
            }
        }
    }
}
