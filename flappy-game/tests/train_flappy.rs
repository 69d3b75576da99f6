use std::sync::Arc;
use std::thread;

use flappy_game::config::Config;
use flappy_game::render::NoopSink;
use flappy_game::score_board::ScoreBoard;
use flappy_game::trainer::Trainer;

fn short_run_config() -> Config {
    let mut config = Config::default();
    config.training.episodes = 3;
    config.training.batch_size = 16;
    config.training.max_steps_per_episode = 200;
    config
}

#[test]
fn parallel_instances_train_and_write_their_own_checkpoints() {
    ql::util::init_logging();

    let dir = tempfile::tempdir().unwrap();
    let mut config = short_run_config();
    config.training.checkpoint_dir = dir.path().to_path_buf();

    let mut handles = vec![];
    for instance_id in 0..2 {
        let config = config.clone();
        handles.push(thread::spawn(move || {
            let score_board = Arc::new(ScoreBoard::new());
            let mut trainer =
                Trainer::new(instance_id, config, Arc::clone(&score_board), Box::new(NoopSink)).unwrap();
            trainer.run().unwrap();
            (trainer.checkpoint_file().to_path_buf(), score_board.get_current_score())
        }));
    }

    let mut checkpoint_files = vec![];
    for handle in handles {
        let (checkpoint_file, score) = handle.join().unwrap();
        assert!(checkpoint_file.exists());
        assert!(score >= 0);
        checkpoint_files.push(checkpoint_file);
    }

    // one uniquely-named artifact per instance
    assert_ne!(checkpoint_files[0], checkpoint_files[1]);
}

#[test]
fn checkpoint_io_failure_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = short_run_config();
    config.training.checkpoint_dir = dir.path().join("does-not-exist");

    let score_board = Arc::new(ScoreBoard::new());
    let mut trainer = Trainer::new(0, config, score_board, Box::new(NoopSink)).unwrap();

    assert!(trainer.run().is_err());
}

#[test]
fn trainer_rejects_invalid_configuration() {
    let mut config = short_run_config();
    config.agent.epsilon_decay = 0.0;

    let score_board = Arc::new(ScoreBoard::new());
    assert!(Trainer::new(0, config, score_board, Box::new(NoopSink)).is_err());
}
