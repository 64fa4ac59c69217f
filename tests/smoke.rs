mod common;

use common::{quick_config, quick_trainer, synthetic_dataset};
use fds_core::{Curriculum, TrainingPhase};

#[test]
fn trainer_runs() {
    let mut trainer = quick_trainer(quick_config());
    let summary = trainer.train(&synthetic_dataset(120, 0.2, 0)).unwrap();
    assert_eq!(summary.epochs_run, trainer.curriculum().total_epochs());
    assert!(summary.final_loss.is_finite());
}

#[test]
fn overriding_curriculum_restarts_position() {
    let data = synthetic_dataset(60, 0.2, 1);
    let mut trainer = quick_trainer(quick_config());
    trainer.train(&data).unwrap();
    let steps = trainer.state().total_gradient_steps;

    trainer
        .set_curriculum(Curriculum::new(vec![TrainingPhase::new("Quick Tune", 1, 1.0, 0.1)]))
        .unwrap();
    assert_eq!(trainer.next_epsilon(), Some(0.1));
    let summary = trainer.train(&data).unwrap();
    assert_eq!(summary.epochs_run, 1);
    assert!(trainer.state().total_gradient_steps > steps);
}

#[test]
fn zero_epoch_phase_is_a_no_op() {
    let mut trainer = quick_trainer(quick_config());
    trainer.set_curriculum(Curriculum::new(vec![
        TrainingPhase::new("empty", 0, 1.0, 1.0),
        TrainingPhase::new("one", 1, 0.5, 0.5),
    ]))
    .unwrap();
    let summary = trainer.train(&synthetic_dataset(40, 0.2, 2)).unwrap();
    assert_eq!(summary.epochs_run, 1);
    assert_eq!(trainer.state().history[0].phase, "one");
}
