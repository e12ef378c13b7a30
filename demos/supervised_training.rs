//! Example of supervised training with trainkit
//!
//! Fits a two-layer MLP to a noisy sine curve, logging per-epoch summaries and
//! recording the loss history. Press Ctrl-C to stop early; the run finishes
//! the current batch, closes its callbacks and exits cleanly.

use anyhow::Result;
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};
use tracing::info;

use trainkit::logging::init_logging;
use trainkit::training::{
    paired_batches, AdamW, LoggingCallback, MetricHistory, ModuleModel, MseLoss, SchedulerConfig,
    TrainerBuilder, TEST, TRAIN,
};
use trainkit::TrainerConfig;

struct Mlp {
    hidden: Linear,
    output: Linear,
}

impl Mlp {
    fn new(vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            hidden: linear(1, 32, vb.pp("hidden"))?,
            output: linear(32, 1, vb.pp("output"))?,
        })
    }
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.output.forward(&self.hidden.forward(xs)?.tanh()?)
    }
}

fn sine_data(samples: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let x = Tensor::arange(0f32, samples as f32, device)?
        .affine(2.0 * std::f64::consts::PI / samples as f64, -std::f64::consts::PI)?
        .reshape((samples, 1))?;
    let noise = Tensor::randn(0f32, 0.05, (samples, 1), device)?;
    let y = (x.sin()? + noise)?;
    Ok((x, y))
}

fn main() -> Result<()> {
    init_logging(0, false, false)?;
    info!("Starting supervised training example");

    let epochs = 50;
    let (x, y) = sine_data(256, &Device::Cpu)?;
    let train = paired_batches(&x, &y, 32)?;
    let (x_test, y_test) = sine_data(64, &Device::Cpu)?;
    let test = paired_batches(&x_test, &y_test, 32)?;

    let model = ModuleModel::new(DType::F32, &Device::Cpu, Mlp::new)?;
    let history = MetricHistory::new();
    let handle = history.handle();

    let mut trainer = TrainerBuilder::new(model, AdamW::new(1e-2), MseLoss)
        .scheduler(SchedulerConfig::Cosine {
            min_lr: 1e-4,
            total_steps: epochs,
            warmup_steps: 2,
        })
        .callback(LoggingCallback::new())
        .callback(history)
        .config(TrainerConfig::default())
        .build_supervised()?;
    trainer.interrupt_handle().install_ctrl_c()?;

    trainer.register_start_epoch("experiment", "sine-mlp");
    trainer.run(epochs, &train, &test)?;

    let train_loss = handle.loss(TRAIN);
    let test_loss = handle.loss(TEST);
    info!(
        "Finished {} epochs: train loss {:.5}, test loss {:.5}",
        train_loss.len(),
        train_loss.last().copied().unwrap_or(f64::NAN),
        test_loss.last().copied().unwrap_or(f64::NAN)
    );

    Ok(())
}
