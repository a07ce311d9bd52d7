//! End-to-end tests: compile a description, push blocks through the chain,
//! check the samples that come out the other side.

use cadena_graph::{
    BlockOutcome, ChannelData, FilterChain, GraphError, ParamValue, StreamConfig,
};
use cadena_registry::PluginRegistry;

fn stream(capture: u32, playback: u32) -> StreamConfig {
    StreamConfig {
        sample_rate: 48000,
        capture_channels: capture,
        playback_channels: playback,
    }
}

fn build(description: &str, capture: u32, playback: u32) -> Result<FilterChain, GraphError> {
    let mut registry = PluginRegistry::new(48000);
    FilterChain::new(description, &mut registry, &stream(capture, playback))
}

/// Runs one block through the chain and returns the output channels.
fn run(chain: &mut FilterChain, inputs: &[Vec<f32>], out_channels: usize) -> Vec<Vec<f32>> {
    let frames = inputs.first().map(|c| c.len()).unwrap_or(0);
    let mut in_bufs: Vec<Vec<f32>> = inputs.to_vec();
    let mut out_bufs: Vec<Vec<f32>> = vec![vec![0.0; frames]; out_channels];

    let mut input: Vec<ChannelData> =
        in_bufs.iter_mut().map(|b| ChannelData::new(b)).collect();
    let mut output: Vec<ChannelData> =
        out_bufs.iter_mut().map(|b| ChannelData::new(b)).collect();

    let outcome = chain.process_block(Some(&mut input), Some(&mut output));
    assert_eq!(outcome, BlockOutcome::Processed(frames));
    drop(output);
    out_bufs
}

#[test]
fn identity_copy_stereo() {
    let mut chain = build(r#"{ nodes = [ { type = builtin label = copy } ] }"#, 2, 2).unwrap();
    assert_eq!(chain.graph().replication(), 2);
    assert_eq!(chain.graph().schedule_len(), 2);

    let out = run(
        &mut chain,
        &[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        2,
    );
    assert_eq!(out[0], vec![1.0, 2.0, 3.0]);
    assert_eq!(out[1], vec![4.0, 5.0, 6.0]);
}

#[test]
fn gain_mixer_collapses_two_channels() {
    let mut chain = build(
        r#"{
            nodes = [ {
                type = builtin label = mixer name = mixer
                control = { "Gain 1" = 0.5 "Gain 2" = 0.25 }
            } ]
            inputs  = [ "mixer:In 1" "mixer:In 2" ]
            outputs = [ "mixer:Out" ]
        }"#,
        2,
        1,
    )
    .unwrap();

    let out = run(&mut chain, &[vec![1.0; 3], vec![4.0; 3]], 1);
    assert_eq!(out[0], vec![1.5, 1.5, 1.5]);
}

#[test]
fn replicated_channels_are_independent() {
    // One mono delay, two stream channels: N = 2 and each channel keeps its
    // own delay state.
    let mut chain = build(
        r#"{
            nodes = [ {
                type = builtin label = delay
                config = { "max-delay" = 0.001 }
                control = { "Delay (s)" = 0.0000625 }
            } ]
        }"#,
        2,
        2,
    )
    .unwrap();
    assert_eq!(chain.graph().replication(), 2);
    assert_eq!(chain.graph().schedule_len(), 2);

    // 0.0000625 s at 48 kHz = 3 samples.
    let out = run(
        &mut chain,
        &[vec![1.0, 2.0, 3.0, 4.0, 5.0], vec![10.0, 20.0, 30.0, 40.0, 50.0]],
        2,
    );
    assert_eq!(out[0], vec![0.0, 0.0, 0.0, 1.0, 2.0]);
    assert_eq!(out[1], vec![0.0, 0.0, 0.0, 10.0, 20.0]);
}

#[test]
fn linked_chain_passes_samples_through_intermediate_buffers() {
    let mut chain = build(
        r#"{
            nodes = [
                { type = builtin label = copy name = a }
                { type = builtin label = copy name = b }
            ]
            links   = [ { output = "a:Out" input = "b:In" } ]
            inputs  = [ "a:In" ]
            outputs = [ "b:Out" ]
        }"#,
        1,
        1,
    )
    .unwrap();

    let ramp: Vec<f32> = (0..64).map(|i| i as f32 * 0.5).collect();
    let out = run(&mut chain, &[ramp.clone()], 1);
    assert_eq!(out[0], ramp);
}

#[test]
fn fan_out_and_fan_in_through_mixer() {
    let mut chain = build(
        r#"{
            nodes = [
                { type = builtin label = copy name = src }
                { type = builtin label = copy name = top }
                { type = builtin label = copy name = bottom }
                { type = builtin label = mixer name = sum }
            ]
            links = [
                { output = "src:Out" input = "top:In" }
                { output = "src:Out" input = "bottom:In" }
                { output = "top:Out" input = "sum:In 1" }
                { output = "bottom:Out" input = "sum:In 2" }
            ]
            inputs  = [ "src:In" ]
            outputs = [ "sum:Out" ]
        }"#,
        1,
        1,
    )
    .unwrap();

    // Both branches carry the same signal: the mixer doubles it.
    let out = run(&mut chain, &[vec![1.0, -2.0, 0.5]], 1);
    assert_eq!(out[0], vec![2.0, -4.0, 1.0]);
}

#[test]
fn second_link_into_same_input_fails_in_use() {
    let err = build(
        r#"{
            nodes = [
                { type = builtin label = copy name = a }
                { type = builtin label = copy name = d }
                { type = builtin label = copy name = b }
            ]
            links = [
                { output = "a:Out" input = "b:In" }
                { output = "d:Out" input = "b:In" }
            ]
        }"#,
        1,
        1,
    )
    .unwrap_err();
    assert!(matches!(err, GraphError::PortInUse(_)));
}

#[test]
fn duplicate_external_input_fails_in_use() {
    let err = build(
        r#"{
            nodes = [ { type = builtin label = copy name = a } ]
            inputs = [ "a:In" "a:In" ]
            outputs = [ "a:Out" null ]
        }"#,
        2,
        2,
    )
    .unwrap_err();
    assert!(matches!(err, GraphError::PortInUse(_)));
}

#[test]
fn control_update_between_blocks() {
    let mut chain = build(
        r#"{
            nodes = [ {
                type = builtin label = mixer name = m
                control = { "Gain 1" = 1.0 }
            } ]
            inputs  = [ "m:In 1" ]
            outputs = [ "m:Out" ]
        }"#,
        1,
        1,
    )
    .unwrap();

    let out = run(&mut chain, &[vec![1.0; 4]], 1);
    assert_eq!(out[0], vec![1.0; 4]);

    // The control write lands before the next block.
    assert_eq!(chain.set_param("m:Gain 1", Some(0.5)), 1);
    let out = run(&mut chain, &[vec![1.0; 4]], 1);
    assert_eq!(out[0], vec![0.5; 4]);
}

#[test]
fn control_update_leaves_other_parameters_alone() {
    let chain = build(
        r#"{
            nodes = [
                { type = builtin label = bq_peaking name = biquad1 }
                { type = builtin label = bq_peaking name = biquad2 }
            ]
            links = [ { output = "biquad1:Out" input = "biquad2:In" } ]
            inputs = [ "biquad1:In" ]
            outputs = [ "biquad2:Out" ]
        }"#,
        1,
        1,
    )
    .unwrap();

    let before = chain.snapshot();
    chain.set_param("biquad1:Freq", Some(1000.0));
    let after = chain.snapshot();

    let freq = after.iter().find(|(n, _)| n == "biquad1:Freq").unwrap();
    assert_eq!(freq.1, ParamValue::Float(1000.0));
    for ((name, old), (_, new)) in before.iter().zip(&after) {
        if name != "biquad1:Freq" {
            assert_eq!(old, new, "{name} changed unexpectedly");
        }
    }
}

#[test]
fn parameter_snapshot_roundtrip_is_byte_identical() {
    let chain = build(
        r#"{
            nodes = [
                { type = builtin label = bq_lowshelf name = shelf control = { Freq = 120.0 Gain = 3.0 } }
                { type = builtin label = mixer name = mix control = { "Gain 1" = 0.7 } }
            ]
            links = [ { output = "shelf:Out" input = "mix:In 1" } ]
            inputs = [ "shelf:In" ]
            outputs = [ "mix:Out" ]
        }"#,
        1,
        1,
    )
    .unwrap();

    let first = serde_json::to_string(&chain.snapshot()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&first).unwrap();
    // Feed every (name, value) pair back through the bridge.
    for entry in parsed.as_array().unwrap() {
        let name = entry[0].as_str().unwrap();
        let value = entry[1].as_f64().map(|v| v as f32);
        chain.set_param(name, value);
    }
    let second = serde_json::to_string(&chain.snapshot()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn dropped_output_channel_is_silenced() {
    let mut chain = build(
        r#"{
            nodes = [ { type = builtin label = copy name = c } ]
            inputs  = [ "c:In" ]
            outputs = [ "c:Out" null ]
        }"#,
        1,
        2,
    )
    .unwrap();

    let mut in_buf = vec![1.0_f32; 4];
    let mut out_a = vec![9.0_f32; 4];
    let mut out_b = vec![9.0_f32; 4];
    let mut input = [ChannelData::new(&mut in_buf)];
    let mut output = [ChannelData::new(&mut out_a), ChannelData::new(&mut out_b)];
    chain.process_block(Some(&mut input), Some(&mut output));
    drop(output);

    assert_eq!(out_a, vec![1.0; 4]);
    assert_eq!(out_b, vec![0.0; 4]);
}

#[test]
fn empty_inputs_list_is_a_config_error() {
    let err = build(
        r#"{
            nodes = [ { type = builtin label = copy } ]
            inputs = [ ]
        }"#,
        1,
        1,
    )
    .unwrap_err();
    assert!(matches!(err, GraphError::NoExternalPorts("input")));
}

#[test]
fn lv2_nodes_report_unsupported() {
    let err = build(
        r#"{ nodes = [ { type = lv2 plugin = "urn:x" label = x } ] }"#,
        1,
        1,
    )
    .unwrap_err();
    assert!(matches!(err, GraphError::Load(_)));
}

#[test]
fn missing_ladspa_plugin_reports_not_found() {
    let err = build(
        r#"{ nodes = [ { type = ladspa plugin = "/no/such/dir/libnope" label = x } ] }"#,
        1,
        1,
    )
    .unwrap_err();
    assert!(matches!(err, GraphError::Load(_)));
}

#[test]
fn convolver_dirac_in_a_chain() {
    let mut chain = build(
        r#"{
            nodes = [ {
                type = builtin label = convolver name = conv
                config = { filename = /dirac blocksize = 64 gain = 2.0 }
            } ]
        }"#,
        1,
        1,
    )
    .unwrap();

    let input: Vec<f32> = (0..256).map(|i| (i % 7) as f32 * 0.1).collect();
    let out = run(&mut chain, &[input.clone()], 1);
    // One partition of latency, then 2x the input.
    for i in 64..256 {
        assert!(
            (out[0][i] - 2.0 * input[i - 64]).abs() < 1e-4,
            "sample {i}: {} vs {}",
            out[0][i],
            2.0 * input[i - 64]
        );
    }
}

#[test]
fn state_persists_across_blocks() {
    let mut chain = build(
        r#"{
            nodes = [ {
                type = builtin label = delay
                config = { "max-delay" = 0.001 }
                control = { "Delay (s)" = 0.000125 }
            } ]
        }"#,
        1,
        1,
    )
    .unwrap();

    // 6-sample delay at 48 kHz, pushed as two 4-frame blocks.
    let a = run(&mut chain, &[vec![1.0, 2.0, 3.0, 4.0]], 1);
    let b = run(&mut chain, &[vec![5.0, 6.0, 7.0, 8.0]], 1);
    assert_eq!(a[0], vec![0.0, 0.0, 0.0, 0.0]);
    assert_eq!(b[0], vec![0.0, 0.0, 1.0, 2.0]);
}
