use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};

use flappy_game::config::Config;
use flappy_game::render::NoopSink;
use flappy_game::score_board::ScoreBoard;
use flappy_game::trainer::Trainer;

fn main() -> Result<()> {
    ql::util::init_logging();

    let mut config = Config::default();
    if let Some(instances) = std::env::args().nth(1) {
        config.training.instances = instances
            .parse()
            .with_context(|| format!("instance count '{instances}' is not a number"))?;
    }
    config.validate()?;

    log::info!("starting {} training instance(s)", config.training.instances);

    let mut handles = Vec::with_capacity(config.training.instances);
    for instance_id in 0..config.training.instances {
        let config = config.clone();
        handles.push(thread::spawn(move || -> Result<()> {
            let score_board = Arc::new(ScoreBoard::new());
            let mut trainer = Trainer::new(instance_id, config, score_board, Box::new(NoopSink))?;
            trainer.run()
        }));
    }

    let mut failures = 0_usize;
    for (instance_id, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(())) => log::info!("instance {instance_id} finished"),
            Ok(Err(e)) => {
                log::error!("instance {instance_id} failed: {e:#}");
                failures += 1;
            }
            Err(_) => {
                log::error!("instance {instance_id} panicked");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} training instance(s) failed");
    }
    Ok(())
}
