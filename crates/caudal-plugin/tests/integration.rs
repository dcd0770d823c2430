//! A complete plugin translation unit: declaration, loader symbols, and
//! block creation wired into a running graph.

use caudal_graph::blocks::{CollectSink, NullSink, VectorSource};
use caudal_graph::Graph;
use caudal_plugin::{PLUGIN_ABI_VERSION, check_abi, declare_plugin};
use caudal_settings::{SettingsMap, SettingsValue};

declare_plugin!(
    "stock-blocks",
    "caudal developers",
    "MIT OR Apache-2.0",
    "0.1.0",
    |plugin| {
        plugin.register_block_type("copy_i64", |_params| {
            Box::new(caudal_graph::blocks::CopyBlock::<i64>::new())
        });
        plugin.register_block_type("ramp_i64", |params| {
            let n = match params.get("length") {
                Some(SettingsValue::Int(n)) => *n,
                _ => 16,
            };
            Box::new(VectorSource::new((0..n).collect()))
        });
        plugin.register_block_type("null_sink_i64", |_params| {
            Box::new(NullSink::<i64>::new())
        });
    }
);

#[test]
fn loader_symbols_hand_out_the_singleton() {
    let first = caudal_plugin_make();
    let second = caudal_plugin_make();
    assert!(std::ptr::eq(first, second), "one process-wide instance");

    // SAFETY: caudal_plugin_make returns the 'static instance.
    let plugin = unsafe { &*first };
    assert_eq!(plugin.abi_version(), PLUGIN_ABI_VERSION);
    assert!(check_abi(plugin).is_ok());
    assert_eq!(plugin.metadata().name, "stock-blocks");
    assert_eq!(plugin.metadata().license, "MIT OR Apache-2.0");

    caudal_plugin_free(first);
}

#[test]
fn provided_blocks_lists_registrations_in_order() {
    let plugin = caudal_plugin_instance();
    assert_eq!(
        plugin.provided_blocks(),
        &[
            "copy_i64".to_string(),
            "ramp_i64".to_string(),
            "null_sink_i64".to_string(),
        ]
    );
}

#[test]
fn created_blocks_run_inside_a_graph() {
    let plugin = caudal_plugin_instance();

    let mut params = SettingsMap::new();
    params.insert("length".into(), SettingsValue::Int(25));
    let source = plugin.create_block("ramp_i64", &params).unwrap();
    let copy = plugin.create_block("copy_i64", &SettingsMap::new()).unwrap();
    assert_eq!(source.name(), "vector_source");

    let mut graph = Graph::new();
    let sink_block = CollectSink::<i64>::new();
    let collected = sink_block.handle();
    let src = graph.add_boxed(source);
    let mid = graph.add_boxed(copy);
    let sink = graph.add_block(sink_block);
    graph.connect::<i64>(src, 0, mid, 0, 64);
    graph.connect::<i64>(mid, 0, sink, 0, 64);
    graph.init().unwrap();

    loop {
        let mut moved = 0;
        for block in graph.blocks_mut() {
            moved += block.work(usize::MAX).performed;
        }
        if moved == 0 {
            break;
        }
    }
    assert_eq!(&*collected.lock(), &(0..25).collect::<Vec<i64>>());
}

#[test]
fn unknown_type_reports_its_name() {
    let plugin = caudal_plugin_instance();
    let result = plugin.create_block("does_not_exist", &SettingsMap::new());
    let err = match result {
        Err(err) => err,
        Ok(_) => panic!("expected an error for an unknown block type"),
    };
    assert!(err.to_string().contains("does_not_exist"));
}
