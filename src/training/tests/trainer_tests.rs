//! Tests for trainer lifecycle, counters, events and construction rules

use anyhow::Result;
use approx::assert_relative_eq;
use candle_core::{DType, Device, Tensor};
use serde_json::json;

use crate::error::Error;
use crate::training::callbacks::Hook;
use crate::training::data::Batch;
use crate::training::group::Group;
use crate::training::interrupt::InterruptHandle;
use crate::training::loss::{scalar_value, LossFn, MseLoss};
use crate::training::model::{identity, Model, ModuleModel};
use crate::training::optimizers::{OptimizerFactory, SchedulerConfig, SchedulerFactory};
use crate::training::trainer::{Iteration, IterationOutput, Trainer, TrainerBuilder, TrainerCore};
use crate::training::trainers::SupervisedTrainer;
use crate::training::{TEST, TRAIN};

use super::fixtures::{
    cpu_config, identity_batches, FailingCallback, InterruptAfter, NoopFactory, Recorded,
    RecordingCallback,
};

/// Forwards the first tensor of every batch with a zero loss; accepts any
/// group shape.
struct PassThrough;

impl Iteration for PassThrough {
    fn run_iteration(
        &mut self,
        core: &mut TrainerCore,
        batch: &Batch,
    ) -> crate::Result<IterationOutput> {
        let output = batch
            .get(0)
            .cloned()
            .ok_or_else(|| Error::invalid_batch("empty batch"))?;
        Ok(IterationOutput {
            loss: Tensor::new(0f32, core.device())?,
            output,
        })
    }
}

fn identity_trainer(
    optimizer: &NoopFactory,
    recorder: RecordingCallback,
) -> crate::Result<SupervisedTrainer> {
    TrainerBuilder::new(identity(), optimizer.clone(), MseLoss)
        .callback(recorder)
        .config(cpu_config())
        .build_supervised()
}

fn linear(inputs: usize, bias: bool) -> crate::Result<Box<dyn Model>> {
    let model = ModuleModel::new(DType::F32, &Device::Cpu, move |vb| {
        candle_nn::linear_b(inputs, 1, bias, vb)
    })?;
    Ok(Box::new(model))
}

fn noop(lr: f64) -> Box<dyn OptimizerFactory> {
    Box::new(NoopFactory::new(lr))
}

fn keyed_trainer(
    models: &[&str],
    optimizers: &[&str],
) -> crate::Result<Trainer<PassThrough>> {
    let models = Group::keyed(
        models
            .iter()
            .map(|key| (*key, Box::new(identity()) as Box<dyn Model>)),
    );
    let optimizers = Group::keyed(optimizers.iter().map(|key| (*key, noop(0.1))));
    TrainerBuilder::from_groups(
        models,
        optimizers,
        Group::single(Box::new(MseLoss) as Box<dyn LossFn>),
    )
    .config(cpu_config())
    .build(PassThrough)
}

fn count(log: &[Recorded], pred: impl Fn(&Recorded) -> bool) -> usize {
    log.iter().filter(|event| pred(event)).count()
}

#[test]
fn test_single_model_construction_selects_cpu() -> Result<()> {
    let trainer = identity_trainer(&NoopFactory::new(0.1), RecordingCallback::new())?;
    assert!(trainer.device().is_cpu());
    assert_eq!(trainer.step(), 0);
    assert_eq!(trainer.epoch(), 0);
    assert_eq!(trainer.learning_rate(), Some(0.1));
    Ok(())
}

#[test]
fn test_train_identity_three_batches() -> Result<()> {
    let optimizer = NoopFactory::new(0.1);
    let recorder = RecordingCallback::new();
    let log = recorder.log();
    let mut trainer = identity_trainer(&optimizer, recorder)?;
    let data = identity_batches(3)?;

    trainer.train(&data)?;

    assert_eq!(trainer.step(), 3);
    assert_eq!(trainer.epoch(), 1);
    assert_eq!(optimizer.steps(), 3);

    let log = log.lock();
    assert_eq!(
        log.last(),
        Some(&Recorded::EndEpoch {
            name: TRAIN.to_string(),
            epoch: 0,
            iter_per_epoch: 3,
            model_training: true,
        })
    );

    let steps: Vec<usize> = log
        .iter()
        .filter_map(|event| match event {
            Recorded::EndIteration { step, .. } => Some(*step),
            _ => None,
        })
        .collect();
    assert_eq!(steps, vec![0, 1, 2]);
    Ok(())
}

#[test]
fn test_events_are_ordered_per_batch() -> Result<()> {
    let recorder = RecordingCallback::new();
    let log = recorder.log();
    let mut trainer = identity_trainer(&NoopFactory::new(0.1), recorder)?;

    trainer.train(&identity_batches(2)?)?;

    let log = log.lock();
    assert!(matches!(log[0], Recorded::StartEpoch { .. }));
    assert!(matches!(log[1], Recorded::StartIteration { step: 0, .. }));
    assert!(matches!(log[2], Recorded::EndIteration { step: 0, .. }));
    assert!(matches!(log[3], Recorded::StartIteration { step: 1, .. }));
    assert!(matches!(log[4], Recorded::EndIteration { step: 1, .. }));
    assert!(matches!(log[5], Recorded::EndEpoch { .. }));
    assert_eq!(log.len(), 6);
    Ok(())
}

#[test]
fn test_end_iteration_reports_loss_function_value() -> Result<()> {
    let recorder = RecordingCallback::new();
    let log = recorder.log();
    let mut trainer = identity_trainer(&NoopFactory::new(0.1), recorder)?;
    let data = identity_batches(3)?;

    trainer.train(&data)?;

    let reported: Vec<(f64, Vec<f32>)> = log
        .lock()
        .iter()
        .filter_map(|event| match event {
            Recorded::EndIteration { loss, output, .. } => Some((*loss, output.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(reported.len(), data.len());

    for (batch, (loss, output)) in data.iter().zip(reported) {
        let expected = scalar_value(&MseLoss.compute(&batch.tensors()[0], &batch.tensors()[1])?)?;
        assert_relative_eq!(loss, expected, epsilon = 1e-9);
        assert_relative_eq!(loss, 0.5, epsilon = 1e-9);
        assert_eq!(output, batch.tensors()[0].to_vec1::<f32>()?);
    }
    Ok(())
}

#[test]
fn test_test_does_not_mutate_counters() -> Result<()> {
    let optimizer = NoopFactory::new(0.1);
    let recorder = RecordingCallback::new();
    let log = recorder.log();
    let mut trainer = identity_trainer(&optimizer, recorder)?;
    let data = identity_batches(3)?;

    trainer.train(&data)?;
    trainer.test(&data)?;
    trainer.test(&data)?;

    assert_eq!(trainer.step(), 3);
    assert_eq!(trainer.epoch(), 1);
    assert_eq!(optimizer.steps(), 3);

    // test-time events report the last training step
    let log = log.lock();
    for event in log.iter() {
        if let Recorded::EndIteration {
            name,
            step,
            is_train,
            ..
        } = event
        {
            if name == TEST {
                assert_eq!(*step, 3);
                assert!(!is_train);
            }
        }
    }
    Ok(())
}

#[test]
fn test_model_in_eval_mode_after_test() -> Result<()> {
    let recorder = RecordingCallback::new();
    let log = recorder.log();
    let mut trainer = identity_trainer(&NoopFactory::new(0.1), recorder)?;
    let data = identity_batches(2)?;

    trainer.train(&data)?;
    assert!(trainer.is_train());
    assert!(trainer.core().model().is_training());

    trainer.test(&data)?;
    assert!(!trainer.is_train());
    assert!(!trainer.core().model().is_training());

    assert!(matches!(
        log.lock().last(),
        Some(Recorded::EndEpoch {
            model_training: false,
            ..
        })
    ));
    Ok(())
}

#[test]
fn test_named_phase() -> Result<()> {
    let recorder = RecordingCallback::new();
    let log = recorder.log();
    let mut trainer = identity_trainer(&NoopFactory::new(0.1), recorder)?;

    trainer.test_named(&identity_batches(1)?, "validation")?;
    assert!(matches!(
        log.lock().first(),
        Some(Recorded::StartEpoch { name, .. }) if name == "validation"
    ));

    let reserved = trainer.test_named(&identity_batches(1)?, TRAIN);
    assert!(matches!(reserved, Err(Error::Config(_))));
    Ok(())
}

#[test]
fn test_start_epoch_extras_until_overwritten() -> Result<()> {
    let recorder = RecordingCallback::new();
    let log = recorder.log();
    let mut trainer = identity_trainer(&NoopFactory::new(0.1), recorder)?;
    let data = identity_batches(1)?;

    trainer.register_start_epoch("tag", "X");
    trainer.train(&data)?;
    trainer.test(&data)?;
    trainer.register_start_epoch("tag", "Y");
    trainer.train(&data)?;

    let tags: Vec<_> = log
        .lock()
        .iter()
        .filter_map(|event| match event {
            Recorded::StartEpoch { extras, .. } => Some(extras.get("tag").cloned()),
            _ => None,
        })
        .collect();
    assert_eq!(tags, vec![Some(json!("X")), Some(json!("X")), Some(json!("Y"))]);
    Ok(())
}

#[test]
fn test_run_dispatches_end_all_then_close() -> Result<()> {
    let recorder = RecordingCallback::new();
    let log = recorder.log();
    let mut trainer = identity_trainer(&NoopFactory::new(0.1), recorder)?;
    let train = identity_batches(3)?;
    let test = identity_batches(2)?;

    trainer.run(2, &train, &test)?;

    assert_eq!(trainer.step(), 6);
    assert_eq!(trainer.epoch(), 2);
    assert!(trainer.callbacks().is_closed());

    let log = log.lock();
    let tail = &log[log.len() - 2..];
    assert_eq!(
        tail,
        &[Recorded::EndAll { step: 6, epoch: 2 }, Recorded::Close]
    );
    assert_eq!(
        count(&log, |e| matches!(e, Recorded::EndEpoch { name, .. } if name == TEST)),
        2
    );
    Ok(())
}

#[test]
fn test_interrupt_mid_epoch_closes_once() -> Result<()> {
    let handle = InterruptHandle::new();
    let recorder = RecordingCallback::new();
    let log = recorder.log();
    let mut trainer = TrainerBuilder::new(identity(), NoopFactory::new(0.1), MseLoss)
        .callback(recorder)
        .callback(InterruptAfter::new(handle.clone(), 2))
        .interrupt(handle.clone())
        .config(cpu_config())
        .build_supervised()?;
    let data = identity_batches(3)?;

    trainer.run(3, &data, &data)?;

    // the interrupted batch is not counted
    assert_eq!(trainer.step(), 1);
    assert_eq!(trainer.epoch(), 0);
    assert!(!handle.is_interrupted());

    let log = log.lock();
    assert_eq!(count(&log, |e| *e == Recorded::Close), 1);
    assert_eq!(count(&log, |e| matches!(e, Recorded::EndEpoch { .. })), 0);
    assert_eq!(count(&log, |e| matches!(e, Recorded::EndAll { .. })), 0);
    Ok(())
}

#[test]
fn test_interrupt_in_last_batch_of_epoch_skips_epoch_end() -> Result<()> {
    let handle = InterruptHandle::new();
    let recorder = RecordingCallback::new();
    let log = recorder.log();
    let data = identity_batches(3)?;
    let mut trainer = TrainerBuilder::new(identity(), NoopFactory::new(0.1), MseLoss)
        .callback(recorder)
        .callback(InterruptAfter::new(handle.clone(), data.len()))
        .interrupt(handle.clone())
        .config(cpu_config())
        .build_supervised()?;

    trainer.run(3, &data, &data)?;

    assert_eq!(trainer.epoch(), 0);
    assert_eq!(trainer.step(), 2);
    assert!(!handle.is_interrupted());

    let log = log.lock();
    assert_eq!(count(&log, |e| matches!(e, Recorded::StartEpoch { .. })), 1);
    assert_eq!(count(&log, |e| matches!(e, Recorded::EndEpoch { .. })), 0);
    assert_eq!(count(&log, |e| *e == Recorded::Close), 1);
    Ok(())
}

#[test]
fn test_interrupt_in_final_batch_of_run_is_cleared() -> Result<()> {
    let handle = InterruptHandle::new();
    let recorder = RecordingCallback::new();
    let log = recorder.log();
    let data = identity_batches(3)?;
    // one train and one test pass
    let mut trainer = TrainerBuilder::new(identity(), NoopFactory::new(0.1), MseLoss)
        .callback(recorder)
        .callback(InterruptAfter::new(handle.clone(), 2 * data.len()))
        .interrupt(handle.clone())
        .config(cpu_config())
        .build_supervised()?;

    trainer.run(1, &data, &data)?;

    assert!(!handle.is_interrupted());
    assert_eq!(count(&log.lock(), |e| matches!(e, Recorded::EndAll { .. })), 0);
    assert_eq!(trainer.step(), 3);
    assert_eq!(trainer.epoch(), 1);

    // the trainer stays usable outside of run
    trainer.train(&data)?;
    assert_eq!(trainer.step(), 6);
    Ok(())
}

#[test]
fn test_second_run_is_rejected() -> Result<()> {
    let recorder = RecordingCallback::new();
    let log = recorder.log();
    let mut trainer = identity_trainer(&NoopFactory::new(0.1), recorder)?;
    let data = identity_batches(2)?;

    trainer.run(1, &data, &data)?;
    let events = log.lock().len();

    assert!(matches!(trainer.run(1, &data, &data), Err(Error::Config(_))));
    assert_eq!(log.lock().len(), events);
    assert_eq!(trainer.epoch(), 1);
    Ok(())
}

#[test]
fn test_interrupt_propagates_from_train() -> Result<()> {
    let recorder = RecordingCallback::new();
    let log = recorder.log();
    let mut trainer = identity_trainer(&NoopFactory::new(0.1), recorder)?;

    trainer.interrupt_handle().interrupt();
    let result = trainer.train(&identity_batches(3)?);

    assert!(matches!(result, Err(Error::Interrupted)));
    assert_eq!(trainer.step(), 0);
    assert_eq!(log.lock().len(), 1);
    Ok(())
}

#[test]
fn test_callback_error_propagates_and_closes_once() -> Result<()> {
    let recorder = RecordingCallback::new();
    let log = recorder.log();
    let mut trainer = TrainerBuilder::new(identity(), NoopFactory::new(0.1), MseLoss)
        .callback(recorder)
        .callback(FailingCallback::new(2))
        .config(cpu_config())
        .build_supervised()?;
    let data = identity_batches(3)?;

    let result = trainer.run(2, &data, &data);

    assert!(matches!(result, Err(Error::Other(_))));
    assert_eq!(count(&log.lock(), |e| *e == Recorded::Close), 1);

    // closing again outside of run is a no-op
    trainer.close()?;
    assert_eq!(count(&log.lock(), |e| *e == Recorded::Close), 1);
    Ok(())
}

#[test]
fn test_keyed_optimizer_superset_fails() {
    let result = keyed_trainer(&["gen"], &["gen", "disc"]);
    assert!(matches!(
        result,
        Err(Error::MissingKey { ref key, collection: "models" }) if key == "disc"
    ));
}

#[test]
fn test_keyed_optimizer_mismatch_fails() {
    let result = keyed_trainer(&["gen", "disc"], &["encoder"]);
    assert!(matches!(result, Err(ref err) if err.is_config()));
}

#[test]
fn test_keyed_optimizer_subset_is_allowed() -> Result<()> {
    let trainer = keyed_trainer(&["gen", "disc"], &["gen"])?;
    assert_eq!(trainer.core().optimizer().keys(), vec!["gen"]);
    Ok(())
}

#[test]
fn test_keyed_optimizer_with_single_model_fails() {
    let result = TrainerBuilder::from_groups(
        Group::single(Box::new(identity()) as Box<dyn Model>),
        Group::keyed([("gen", noop(0.1))]),
        Group::single(Box::new(MseLoss) as Box<dyn LossFn>),
    )
    .config(cpu_config())
    .build(PassThrough);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_keyed_scheduler_with_single_optimizer_fails() {
    let result = TrainerBuilder::new(identity(), NoopFactory::new(0.1), MseLoss)
        .schedulers(Group::keyed([(
            "gen",
            Box::new(SchedulerConfig::Constant) as Box<dyn SchedulerFactory>,
        )]))
        .config(cpu_config())
        .build_supervised();
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_keyed_scheduler_superset_fails() {
    let models = Group::keyed([
        ("gen", Box::new(identity()) as Box<dyn Model>),
        ("disc", Box::new(identity()) as Box<dyn Model>),
    ]);
    let result = TrainerBuilder::from_groups(
        models,
        Group::keyed([("gen", noop(0.1)), ("disc", noop(0.1))]),
        Group::single(Box::new(MseLoss) as Box<dyn LossFn>),
    )
    .schedulers(Group::keyed([
        ("gen", Box::new(SchedulerConfig::Constant) as Box<dyn SchedulerFactory>),
        ("critic", Box::new(SchedulerConfig::Constant) as Box<dyn SchedulerFactory>),
    ]))
    .config(cpu_config())
    .build(PassThrough);
    assert!(matches!(
        result,
        Err(Error::MissingKey { collection: "optimizers", .. })
    ));
}

#[test]
fn test_optimizers_bind_key_to_key() -> Result<()> {
    let models = Group::keyed([("gen", linear(2, true)?), ("disc", linear(3, false)?)]);
    let trainer = TrainerBuilder::from_groups(
        models,
        Group::keyed([("gen", noop(0.1)), ("disc", noop(0.2))]),
        Group::single(Box::new(MseLoss) as Box<dyn LossFn>),
    )
    .config(cpu_config())
    .build(PassThrough)?;

    let optimizers = trainer.core().optimizer();
    let gen = optimizers.get("gen").map(|o| o.parameter_count());
    let disc = optimizers.get("disc").map(|o| o.parameter_count());
    assert_eq!(gen, Some(2));
    assert_eq!(disc, Some(1));
    assert_eq!(trainer.learning_rate(), None);
    Ok(())
}

#[test]
fn test_single_optimizer_binds_every_model() -> Result<()> {
    let models = Group::keyed([("gen", linear(2, true)?), ("disc", linear(3, false)?)]);
    let trainer = TrainerBuilder::from_groups(
        models,
        Group::single(noop(0.1)),
        Group::single(Box::new(MseLoss) as Box<dyn LossFn>),
    )
    .config(cpu_config())
    .build(PassThrough)?;

    let count = trainer
        .core()
        .optimizer()
        .as_single()
        .map(|o| o.parameter_count());
    assert_eq!(count, Some(3));
    Ok(())
}

#[test]
fn test_scheduler_steps_once_per_train() -> Result<()> {
    let mut trainer = TrainerBuilder::new(identity(), NoopFactory::new(1.0), MseLoss)
        .scheduler(SchedulerConfig::Step {
            step_size: 2,
            gamma: 0.1,
            warmup_steps: 0,
        })
        .config(cpu_config())
        .build_supervised()?;
    let data = identity_batches(3)?;

    assert_eq!(trainer.learning_rate(), Some(1.0));
    trainer.train(&data)?;
    assert_relative_eq!(trainer.learning_rate().unwrap_or_default(), 1.0);
    trainer.test(&data)?;
    assert_relative_eq!(trainer.learning_rate().unwrap_or_default(), 1.0);
    trainer.train(&data)?;
    assert_relative_eq!(trainer.learning_rate().unwrap_or_default(), 0.1, epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_single_scheduler_updates_every_keyed_optimizer() -> Result<()> {
    let models = Group::keyed([
        ("gen", Box::new(identity()) as Box<dyn Model>),
        ("disc", Box::new(identity()) as Box<dyn Model>),
    ]);
    let mut trainer = TrainerBuilder::from_groups(
        models,
        Group::keyed([("gen", noop(1.0)), ("disc", noop(0.5))]),
        Group::single(Box::new(MseLoss) as Box<dyn LossFn>),
    )
    .scheduler(SchedulerConfig::Exponential {
        gamma: 0.5,
        warmup_steps: 0,
    })
    .config(cpu_config())
    .build(PassThrough)?;

    assert!(trainer.core().scheduler().is_some_and(|s| s.is_keyed()));
    trainer.train(&identity_batches(1)?)?;

    let rates = trainer.learning_rates();
    assert_relative_eq!(rates.get("gen").copied().unwrap_or_default(), 0.5);
    assert_relative_eq!(rates.get("disc").copied().unwrap_or_default(), 0.25);
    Ok(())
}

#[test]
fn test_warmup_scheduler_sets_initial_rate() -> Result<()> {
    let trainer = TrainerBuilder::new(identity(), NoopFactory::new(1.0), MseLoss)
        .scheduler(SchedulerConfig::Linear {
            min_lr: 0.0,
            total_steps: 10,
            warmup_steps: 4,
        })
        .config(cpu_config())
        .build_supervised()?;

    assert_relative_eq!(trainer.learning_rate().unwrap_or_default(), 0.25);
    Ok(())
}

#[test]
fn test_to_device_is_lazy_and_ordered() -> Result<()> {
    let trainer = identity_trainer(&NoopFactory::new(0.1), RecordingCallback::new())?;
    let data = identity_batches(2)?;
    let batch = &data[1];

    let mut moved = trainer.to_device(batch.tensors());
    let first = moved.next().transpose()?;
    assert_eq!(first.map(|t| t.to_vec1::<f32>()).transpose()?, Some(vec![1.0, 2.0]));
    assert_eq!(moved.count(), 1);
    Ok(())
}

#[test]
fn test_registered_values_per_hook() -> Result<()> {
    let mut trainer = identity_trainer(&NoopFactory::new(0.1), RecordingCallback::new())?;
    trainer.register_end_iteration("scale", 2);
    trainer.register_end_all("run", "baseline");

    assert_eq!(trainer.extras(Hook::EndIteration).get("scale"), Some(&json!(2)));
    assert_eq!(trainer.extras(Hook::EndAll).get("run"), Some(&json!("baseline")));
    assert!(trainer.extras(Hook::StartEpoch).is_empty());
    Ok(())
}
