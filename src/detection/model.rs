use super::postprocess::{decode_predictions, letterbox, non_max_suppression, rescale, INPUT_SIZE};
use super::options::DetectionOptions;
use super::{Detection, Detector};
use anyhow::{bail, Context, Result};
use image::RgbImage;
use log::{debug, info};
use std::convert::TryFrom;
use tch::{CModule, Device, Kind, Tensor};

/// Ultralytics YOLO detector exported with `format=torchscript`.
pub struct TorchScriptDetector {
    model: CModule,
    device: Device,
    conf_threshold: f32,
    iou_threshold: f32,
    max_detections: usize,
}

impl TorchScriptDetector {
    pub fn load(opts: &DetectionOptions) -> Result<Self> {
        let device = Device::cuda_if_available();
        let mut model = CModule::load_on_device(&opts.model_path, device).with_context(|| {
            format!("Could not load detector model {}", opts.model_path.display())
        })?;
        model.set_eval();
        info!("Loaded detector {} on {:?}", opts.model_path.display(), device);
        Ok(Self {
            model,
            device,
            conf_threshold: opts.conf_threshold,
            iou_threshold: opts.iou_threshold,
            max_detections: opts.max_detections,
        })
    }
}

impl Detector for TorchScriptDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let input = letterbox(image, INPUT_SIZE);
        let side = i64::from(input.size);
        let tensor = Tensor::from_slice(&input.data)
            .view([1, 3, side, side])
            .to_device(self.device);

        let output = tch::no_grad(|| self.model.forward_ts(&[tensor]))?;
        let size = output.size();
        if size.len() != 3 || size[0] != 1 {
            bail!("Unexpected detector output shape {:?}", size);
        }
        let num_anchors = size[2] as usize;
        debug!("Detector output {:?}", size);

        let flat = output
            .to_kind(Kind::Float)
            .to_device(Device::Cpu)
            .flatten(0, -1);
        let values = Vec::<f32>::try_from(&flat)?;
        let candidates = decode_predictions(&values, num_anchors, self.conf_threshold);
        let mut detections =
            non_max_suppression(candidates, self.iou_threshold, self.max_detections);
        rescale(&mut detections, &input, image.width(), image.height());
        Ok(detections)
    }
}
