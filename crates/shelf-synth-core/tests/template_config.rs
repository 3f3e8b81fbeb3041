mod common;

use common::Fixture;
use shelf_synth_core::prelude::*;
use shelf_synth_core::templates::{BackgroundConfig, ForegroundSize};
use std::collections::BTreeMap;
use std::fs;

#[test]
fn store_resolves_descriptors_and_paths() {
    let fx = Fixture::with_slanted();
    let store = fx.store();
    assert_eq!(store.background_labels(), vec!["flat", "slanted"]);

    let bg = store.background("slanted").unwrap();
    assert_eq!(bg.file, fx.template_dir.join("backgrounds").join("slanted.jpg"));
    assert_eq!(bg.lines.len(), 4);
    assert_eq!(store.shelf("slanted").unwrap().regions().len(), 2);

    let fg = store.foreground("cans", "c1").unwrap();
    assert_eq!((fg.native_width, fg.native_height), (50, 100));
    assert_eq!(
        fg.file,
        fx.template_dir.join("foregrounds").join("cans").join("c1.png")
    );
    assert_eq!(store.class_id("bottles").unwrap(), 1);
    assert_eq!(store.labels_in("boxes").unwrap(), vec!["x1"]);
}

#[test]
fn lookups_report_what_is_missing() {
    let store = Fixture::flat().store();
    assert!(matches!(
        store.background("nope").unwrap_err(),
        SynthError::UnknownBackground(_)
    ));
    assert!(matches!(
        store.foreground("bottles", "nope").unwrap_err(),
        SynthError::UnknownObject { .. }
    ));
    assert!(matches!(
        store.labels_in("nope").unwrap_err(),
        SynthError::UnknownCategory(_)
    ));
    assert!(matches!(
        store.class_id("boxes").unwrap_err(),
        SynthError::MissingClassId(_)
    ));
    let nomask = vec!["boxes".to_string()];
    assert!(store.check_categories(&nomask, false).is_ok());
    assert!(store.check_categories(&nomask, true).is_err());
}

#[test]
fn missing_and_malformed_config_files() {
    let fx = Fixture::flat();
    fs::remove_file(fx.config_dir.join("class_map.json")).unwrap();
    let err = TemplateStore::open(&fx.config_dir, &fx.template_dir).unwrap_err();
    assert!(matches!(err, SynthError::ConfigRead { .. }));

    fs::write(fx.config_dir.join("class_map.json"), "{ not json").unwrap();
    let err = TemplateStore::open(&fx.config_dir, &fx.template_dir).unwrap_err();
    assert!(matches!(err, SynthError::ConfigParse { .. }));
}

#[test]
fn vertical_boundary_line_fails_to_load() {
    let fx = Fixture::flat();
    fs::write(
        fx.config_dir.join("backgrounds.json"),
        r#"{"bad": {"shelves": [
            {"x_start": 0, "y_start": 0, "x_end": 100, "y_end": 0},
            {"x_start": 50, "y_start": 10, "x_end": 50, "y_end": 90}
        ]}}"#,
    )
    .unwrap();
    let err = TemplateStore::open(&fx.config_dir, &fx.template_dir).unwrap_err();
    assert!(matches!(err, SynthError::InvalidGeometry { .. }));
}

#[test]
fn from_parts_validates_templates() {
    let fx = Fixture::flat();
    let fg: BTreeMap<String, BTreeMap<String, ForegroundSize>> = BTreeMap::new();
    let cm: BTreeMap<String, u32> = BTreeMap::new();

    assert!(TemplateStore::from_parts(&fx.template_dir, BTreeMap::new(), fg.clone(), cm.clone()).is_err());

    // only a dummy-capped region: nothing placeable
    let mut bgs = BTreeMap::new();
    bgs.insert(
        "capped".to_string(),
        BackgroundConfig {
            shelves: vec![common::line(0.0, 0.0, 10.0, 0.0), common::dummy(0.0, 5.0, 10.0, 5.0)],
        },
    );
    assert!(TemplateStore::from_parts(&fx.template_dir, bgs, fg.clone(), cm.clone()).is_err());

    let mut bgs = BTreeMap::new();
    bgs.insert(
        "ok".to_string(),
        BackgroundConfig {
            shelves: vec![common::line(0.0, 0.0, 10.0, 0.0), common::line(0.0, 5.0, 10.0, 5.0)],
        },
    );
    let mut zero = BTreeMap::new();
    zero.insert(
        "bottles".to_string(),
        BTreeMap::from([("b".to_string(), ForegroundSize { height: 0, width: 3 })]),
    );
    assert!(TemplateStore::from_parts(&fx.template_dir, bgs, zero, cm).is_err());
}

#[test]
fn id_class_map_inverts_class_map() {
    let store = Fixture::flat().store();
    let inv = store.id_class_map();
    assert_eq!(inv.len(), 2);
    assert_eq!(inv[&1], "bottles");
    assert_eq!(inv[&2], "cans");
}

#[test]
fn options_defaults_and_validation() {
    let o = GenerateOptions::default();
    assert_eq!(o.categories, vec!["bottles"]);
    assert_eq!(o.rotation_probability, 0.1);
    assert_eq!(o.max_x_offset, 1);
    assert_eq!(o.max_objs_in_pack, 3);
    assert_eq!(o.obj_sizes_allowed, ObjectSize::ALL.to_vec());
    assert_eq!(o.skip_shelf_probability, 0.0);
    assert!(o.validate().is_ok());

    let cases: Vec<GenerateOptions> = vec![
        GenerateOptions::builder().rotation_probability(-0.1).build(),
        GenerateOptions::builder().skip_shelf_probability(1.01).build(),
        GenerateOptions::builder().max_x_offset(0).build(),
        GenerateOptions::builder().max_objs_in_pack(0).build(),
        GenerateOptions::builder().obj_sizes_allowed(vec![]).build(),
        GenerateOptions::builder().categories(Vec::<String>::new()).build(),
        GenerateOptions::builder().stamp("a/b").build(),
    ];
    for c in cases {
        assert!(matches!(c.validate(), Err(SynthError::InvalidConfig(_))), "{c:?}");
    }
}

#[test]
fn category_pool_is_deduplicated_union() {
    let o = GenerateOptions::builder()
        .categories(["bottles", "cans"])
        .nomask_categories(["boxes", "cans"])
        .build();
    assert_eq!(o.category_pool(), vec!["bottles", "cans", "boxes"]);
    assert!(o.is_nomask("boxes"));
    assert!(!o.is_nomask("bottles"));
}

#[test]
fn options_deserialize_with_defaults() {
    let o: GenerateOptions =
        serde_json::from_str(r#"{"categories":["cans"],"obj_sizes_allowed":["small","large"],"seed":5}"#)
            .unwrap();
    assert_eq!(o.categories, vec!["cans"]);
    assert_eq!(o.obj_sizes_allowed, vec![ObjectSize::Small, ObjectSize::Large]);
    assert_eq!(o.seed, 5);
    assert_eq!(o.max_objs_in_pack, 3);
    assert!(o.parallel_regions);
}

#[test]
fn size_factors() {
    assert_eq!(ObjectSize::Small.factor(), 0.6);
    assert_eq!(ObjectSize::Medium.factor(), 0.7);
    assert_eq!(ObjectSize::Large.factor(), 0.8);
    assert_eq!("M".parse::<ObjectSize>(), Ok(ObjectSize::Medium));
    assert!("huge".parse::<ObjectSize>().is_err());
}
