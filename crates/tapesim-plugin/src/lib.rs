// TapeSim: reel-to-reel tape machine effect plugin (CLAP + VST3).

use nih_plug::prelude::*;
use std::num::NonZeroU32;
use std::sync::Arc;
use tapesim_dsp::TapeMachine;

mod params;
use params::TapeSimParams;

struct TapeSim {
    params: Arc<TapeSimParams>,
    machine: TapeMachine,
}

impl Default for TapeSim {
    fn default() -> Self {
        Self {
            params: Arc::new(TapeSimParams::default()),
            machine: TapeMachine::new(),
        }
    }
}

impl Plugin for TapeSim {
    const NAME: &'static str = "TapeSim";
    const VENDOR: &'static str = "TapeSim";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Stereo runs the left channel through the tape and copies it right
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        context: &mut impl InitContext<Self>,
    ) -> bool {
        let sample_rate = buffer_config.sample_rate as f64;
        let max_block = buffer_config.max_buffer_size as usize;

        self.machine
            .set_parameters(&self.params.physical_parameters(1));
        if let Err(err) = self.machine.prepare(sample_rate, max_block) {
            nih_error!("tape machine rejected host config: {err}");
            return false;
        }
        nih_log!("tape machine prepared at {sample_rate} Hz, max block {max_block}");

        context.set_latency_samples(self.machine.latency_samples());
        true
    }

    fn reset(&mut self) {
        self.machine.reset();
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        // One snapshot per host buffer; the machine applies it at block start
        let num_samples = buffer.samples().max(1) as u32;
        self.machine
            .set_parameters(&self.params.physical_parameters(num_samples));
        self.machine.process_channels(buffer.as_slice());

        ProcessStatus::Normal
    }
}

impl ClapPlugin for TapeSim {
    const CLAP_ID: &'static str = "com.tapesim.reel-to-reel";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("Reel-to-reel tape machine with magnetic hysteresis, head loss, bias and flutter");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Distortion,
        ClapFeature::Stereo,
        ClapFeature::Mono,
    ];
}

impl Vst3Plugin for TapeSim {
    const VST3_CLASS_ID: [u8; 16] = *b"TapeSimReel2Reel";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Distortion];
}

nih_export_clap!(TapeSim);
nih_export_vst3!(TapeSim);
