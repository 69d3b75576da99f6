use std::sync::Mutex;

/// Current game score, shared with the (external) capture/telemetry loop.
///
/// Constructed once per training instance and handed by reference to both
/// the trainer and the consumer; that consumer polls from its own loop, so
/// reads and writes are serialized by an internal lock. There is no global
/// instance.
#[derive(Debug, Default)]
pub struct ScoreBoard {
    score: Mutex<i32>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_current_score(&self) -> i32 {
        *self.score.lock().unwrap()
    }

    pub fn set_current_score(&self, score: i32) {
        *self.score.lock().unwrap() = score;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn score_is_readable_while_a_writer_runs() {
        let board = Arc::new(ScoreBoard::new());

        let writer = {
            let board = Arc::clone(&board);
            thread::spawn(move || {
                for score in 0..1000 {
                    board.set_current_score(score);
                }
            })
        };

        for _ in 0..1000 {
            let score = board.get_current_score();
            assert!((0..1000).contains(&score));
        }
        writer.join().unwrap();

        assert_eq!(board.get_current_score(), 999);
    }
}
