use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use skillshot_core::devices::SwitchState;
use skillshot_core::game::GameController;
use skillshot_core::modes::{
    AttractConfig, AttractMode, BallSearchConfig, BallSearchMode, BonusConfig, BonusMode,
    DropTargetBankConfig, DropTargetBankMode, HighScoreMode, ServiceConfig, ServiceMode,
    TiltConfig, TiltMode, TroughConfig, TroughMode,
};
use skillshot_core::persist::SettingsStore;
use skillshot_sim::stores::{JsonHighScoreStore, JsonSettingsStore};
use skillshot_sim::{ScriptStep, SimPlatform};

use skillshot_nova::{
    ConsoleMediaSink, NovaBaseMode, NovaConfig, POP_LEFT_ADDRESS, SHOOTER_LANE_ADDRESS,
    START_BUTTON_ADDRESS, TROUGH_1_ADDRESS, TROUGH_ADDRESSES, configure_machine,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let nova_config = NovaConfig::load();
    let settings = JsonSettingsStore::new(&nova_config.settings_path).load();
    tracing::info!(
        "Nova Strike starting: {} balls per game, up to {} players",
        settings.balls_per_game,
        settings.max_players
    );

    let sim = SimPlatform::new();
    for address in TROUGH_ADDRESSES {
        sim.set_initial(address, SwitchState::Open);
    }

    let mut game = GameController::new(sim.handle(), Box::new(ConsoleMediaSink))
        .with_settings(settings.clone());

    let cancel = CancellationToken::new();
    if let Err(err) = game.connect(&cancel) {
        tracing::error!("platform connect failed: {err}");
        return;
    }
    if let Err(err) = game.configure(configure_machine) {
        tracing::error!("machine configuration failed: {err}");
        return;
    }

    game.register(
        TroughMode::new(TroughConfig {
            auto_ball_save_seconds: settings.ball_save_seconds,
            ..TroughConfig::default()
        }),
        None,
    );
    game.register(
        TiltMode::new(TiltConfig {
            warnings_allowed: settings.tilt_warnings,
            ..TiltConfig::default()
        }),
        None,
    );
    game.register(BonusMode::new(BonusConfig::default()), None);
    game.register(
        BallSearchMode::new(BallSearchConfig {
            coils: vec![
                "pop_left_coil".to_string(),
                "pop_right_coil".to_string(),
                "pop_top_coil".to_string(),
            ],
            ..BallSearchConfig::default()
        }),
        None,
    );
    game.register(
        DropTargetBankMode::new(DropTargetBankConfig {
            target_switches: vec![
                "drop_a".to_string(),
                "drop_b".to_string(),
                "drop_c".to_string(),
            ],
            reset_coil: "drop_reset".to_string(),
            auto_reset_secs: 4.0,
            ..DropTargetBankConfig::default()
        }),
        None,
    );
    game.register(ServiceMode::new(ServiceConfig::default()), None);
    game.register(
        HighScoreMode::new(Box::new(JsonHighScoreStore::new(
            &nova_config.high_scores_path,
        ))),
        None,
    );
    game.register(AttractMode::new(AttractConfig::default()), None);
    game.register(NovaBaseMode::new(nova_config), None);

    // A short scripted session so a headless run shows a game happening:
    // press start, serve, plunge, bounce around, drain.
    let script = vec![
        ScriptStep {
            after: Duration::from_millis(500),
            address: START_BUTTON_ADDRESS,
            state: SwitchState::Closed,
        },
        ScriptStep {
            after: Duration::from_millis(100),
            address: START_BUTTON_ADDRESS,
            state: SwitchState::Open,
        },
        ScriptStep {
            after: Duration::from_millis(300),
            address: TROUGH_1_ADDRESS,
            state: SwitchState::Closed,
        },
        ScriptStep {
            after: Duration::from_millis(200),
            address: SHOOTER_LANE_ADDRESS,
            state: SwitchState::Closed,
        },
        ScriptStep {
            after: Duration::from_millis(800),
            address: SHOOTER_LANE_ADDRESS,
            state: SwitchState::Open,
        },
        ScriptStep {
            after: Duration::from_millis(400),
            address: POP_LEFT_ADDRESS,
            state: SwitchState::Closed,
        },
        ScriptStep {
            after: Duration::from_millis(120),
            address: POP_LEFT_ADDRESS,
            state: SwitchState::Open,
        },
        ScriptStep {
            after: Duration::from_secs(2),
            address: TROUGH_1_ADDRESS,
            state: SwitchState::Open,
        },
    ];
    tokio::spawn(sim.clone().play_script(script, cancel.clone()));

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down");
            ctrl_c_cancel.cancel();
        }
    });

    if let Err(err) = game.run(cancel).await {
        tracing::error!("game loop failed: {err}");
    }
}
