//! Integration tests for translated content and ICU expressions.

use std::sync::Arc;

use horizon_lattice_view::i18n::mask_bit;
use horizon_lattice_view::{
    BindingValue, I18nBlock, I18nCreateOp, IcuCreateOp, IcuExpression, IcuKind, IcuRemoveOp, MemoryRenderer,
    NodeHandle, RenderFlags, Renderer, Runtime, RuntimeConfigBuilder, TemplateKind, UpdateBlock, UpdateOp,
    ViewId, ViewTemplate,
};
use parking_lot::Mutex;

fn setup(locale: &str) -> (Arc<MemoryRenderer>, Runtime) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let renderer = Arc::new(MemoryRenderer::new());
    let config = RuntimeConfigBuilder::new().dev_mode(true).locale(locale).build();
    let rt = Runtime::with_config(renderer.clone(), config);
    (renderer, rt)
}

/// `<p i18n>Total: {count}; {count, plural, =0 {no items} one {one item} other {{count} items}}</p>`
///
/// Slots: 0 `p`, 1 the block, 2 the text, 3 the ICU anchor, 4 the active
/// case, 5 to 7 the case texts.
fn counter_block() -> Arc<I18nBlock> {
    let icu = IcuExpression::new(IcuKind::Plural, 3, 4)
        .case(
            "=0",
            vec![
                IcuCreateOp::Text { index: 5, value: "no items".into() },
                IcuCreateOp::AppendChild { parent: None, child: 5 },
            ],
            vec![IcuRemoveOp::Node(5)],
            Vec::new(),
        )
        .case(
            "one",
            vec![
                IcuCreateOp::Text { index: 6, value: "one item".into() },
                IcuCreateOp::AppendChild { parent: None, child: 6 },
            ],
            vec![IcuRemoveOp::Node(6)],
            Vec::new(),
        )
        .case(
            "other",
            vec![
                IcuCreateOp::Text { index: 7, value: String::new() },
                IcuCreateOp::AppendChild { parent: None, child: 7 },
            ],
            vec![IcuRemoveOp::Node(7)],
            vec![UpdateBlock::new(
                mask_bit(1),
                vec![UpdateOp::Expr(1), UpdateOp::Text(" items".into()), UpdateOp::SetText(7)],
            )],
        );
    Arc::new(I18nBlock {
        create: vec![
            I18nCreateOp::Text { index: 2, value: String::new(), append_now: true },
            I18nCreateOp::Comment { index: 3, value: "ICU".into(), append_now: true },
        ],
        update: vec![
            UpdateBlock::new(
                mask_bit(0),
                vec![
                    UpdateOp::Text("Total: ".into()),
                    UpdateOp::Expr(0),
                    UpdateOp::Text("; ".into()),
                    UpdateOp::SetText(2),
                ],
            ),
            UpdateBlock::new(mask_bit(1), vec![UpdateOp::Expr(1), UpdateOp::IcuSwitch(3)]),
            UpdateBlock::new(mask_bit(1), vec![UpdateOp::IcuUpdate(3)]),
        ],
        icus: vec![Arc::new(icu)],
    })
}

fn counter_view(rt: &mut Runtime, renderer: &MemoryRenderer) -> (Arc<Mutex<i64>>, NodeHandle, ViewId) {
    let count = Arc::new(Mutex::new(0i64));
    let bound = count.clone();
    let block = counter_block();
    let template = ViewTemplate::builder("Counter", TemplateKind::Root)
        .decls(8)
        .vars(2)
        .template(move |rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element_start(0, "p", None, &[])?;
                rt.i18n(1, block.clone())?;
                rt.element_end()?;
            }
            if flags.contains(RenderFlags::UPDATE) {
                let current = *bound.lock();
                rt.i18n_exp(current)?;
                rt.i18n_exp(current)?;
                rt.i18n_apply(1)?;
            }
            Ok(())
        })
        .build();
    let host = renderer.create_element("host", None);
    let view = rt.create_root_view(&template, Some(host), None).unwrap();
    (count, host, view)
}

#[test]
fn test_plural_cases_switch_in_place() {
    let (renderer, mut rt) = setup("en-US");
    let (count, host, view) = counter_view(&mut rt, &renderer);
    assert_eq!(renderer.serialize(host), "<host><p><!--ICU--></p></host>");

    rt.detect_changes(view).unwrap();
    assert_eq!(renderer.serialize(host), "<host><p>Total: 0; no items<!--ICU--></p></host>");

    *count.lock() = 1;
    rt.detect_changes(view).unwrap();
    assert_eq!(renderer.serialize(host), "<host><p>Total: 1; one item<!--ICU--></p></host>");

    *count.lock() = 5;
    rt.detect_changes(view).unwrap();
    assert_eq!(renderer.serialize(host), "<host><p>Total: 5; 5 items<!--ICU--></p></host>");

    // Same case, new value: only the case's update blocks run.
    *count.lock() = 7;
    rt.detect_changes(view).unwrap();
    assert_eq!(renderer.serialize(host), "<host><p>Total: 7; 7 items<!--ICU--></p></host>");
}

#[test]
fn test_returning_to_a_case_reuses_its_nodes() {
    let (renderer, mut rt) = setup("en-US");
    let (count, host, view) = counter_view(&mut rt, &renderer);
    rt.refresh_view(view).unwrap();
    let p = renderer.children(host)[0];
    let no_items = renderer.children(p)[1];

    *count.lock() = 3;
    rt.refresh_view(view).unwrap();
    assert_eq!(renderer.children(p).len(), 3);
    let nodes = renderer.node_count();

    *count.lock() = 0;
    rt.refresh_view(view).unwrap();
    assert_eq!(renderer.children(p)[1], no_items);
    assert_eq!(renderer.node_count(), nodes);
    assert_eq!(renderer.text_content(p), "Total: 0; no items");
}

#[test]
fn test_unchanged_bindings_skip_updates() {
    let (renderer, mut rt) = setup("en-US");
    let (_, host, view) = counter_view(&mut rt, &renderer);
    rt.refresh_view(view).unwrap();
    let p = renderer.children(host)[0];
    let text = renderer.children(p)[0];

    // An edit the runtime does not know about survives an unchanged refresh.
    renderer.set_value(text, "edited");
    rt.refresh_view(view).unwrap();
    assert_eq!(renderer.value(text).as_deref(), Some("edited"));
}

#[cfg(feature = "localization")]
#[test]
fn test_plural_category_follows_configured_locale() {
    let (renderer, mut rt) = setup("pl");
    // Slots: 0 `span`, 1 the block, 2 the ICU anchor, 3 the active case,
    // 4 and 5 the case texts.
    let block = Arc::new(I18nBlock {
        create: vec![I18nCreateOp::Comment { index: 2, value: "ICU".into(), append_now: true }],
        update: vec![
            UpdateBlock::new(mask_bit(0), vec![UpdateOp::Expr(0), UpdateOp::IcuSwitch(2)]),
            UpdateBlock::new(mask_bit(0), vec![UpdateOp::IcuUpdate(2)]),
        ],
        icus: vec![Arc::new(
            IcuExpression::new(IcuKind::Plural, 2, 3)
                .case(
                    "few",
                    vec![
                        IcuCreateOp::Text { index: 4, value: "kilka".into() },
                        IcuCreateOp::AppendChild { parent: None, child: 4 },
                    ],
                    vec![IcuRemoveOp::Node(4)],
                    Vec::new(),
                )
                .case(
                    "other",
                    vec![
                        IcuCreateOp::Text { index: 5, value: "inne".into() },
                        IcuCreateOp::AppendChild { parent: None, child: 5 },
                    ],
                    vec![IcuRemoveOp::Node(5)],
                    Vec::new(),
                ),
        )],
    });
    let value = Arc::new(Mutex::new(3i64));
    let bound = value.clone();
    let template = ViewTemplate::builder("Polish", TemplateKind::Root)
        .decls(6)
        .vars(1)
        .template(move |rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element_start(0, "span", None, &[])?;
                rt.i18n_start(1, block.clone())?;
                rt.i18n_end()?;
                rt.element_end()?;
            }
            if flags.contains(RenderFlags::UPDATE) {
                let current = *bound.lock();
                rt.i18n_exp(current)?;
                rt.i18n_apply(1)?;
            }
            Ok(())
        })
        .build();
    let host = renderer.create_element("host", None);
    let view = rt.create_root_view(&template, Some(host), None).unwrap();

    rt.refresh_view(view).unwrap();
    assert_eq!(renderer.text_content(host), "kilka");

    *value.lock() = 10;
    rt.refresh_view(view).unwrap();
    assert_eq!(renderer.text_content(host), "inne");
}

#[test]
fn test_translated_attribute_is_bound_as_property() {
    let (renderer, mut rt) = setup("en-US");
    let name = Arc::new(Mutex::new("Ada".to_string()));
    let bound = name.clone();
    let template = ViewTemplate::builder("Photo", TemplateKind::Root)
        .decls(2)
        .vars(1)
        .template(move |rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element_start(0, "img", None, &[])?;
                rt.i18n_attributes(
                    1,
                    vec![UpdateBlock::new(
                        mask_bit(0),
                        vec![
                            UpdateOp::Text("Photo of ".into()),
                            UpdateOp::Expr(0),
                            UpdateOp::SetAttr { node: 0, name: "alt".into() },
                        ],
                    )],
                )?;
                rt.element_end()?;
            }
            if flags.contains(RenderFlags::UPDATE) {
                let current = bound.lock().clone();
                rt.i18n_exp(current)?;
                rt.i18n_apply(1)?;
            }
            Ok(())
        })
        .build();
    let host = renderer.create_element("host", None);
    let view = rt.create_root_view(&template, Some(host), None).unwrap();
    rt.detect_changes(view).unwrap();

    let img = renderer.children(host)[0];
    assert_eq!(renderer.property(img, "alt"), Some(BindingValue::from("Photo of Ada")));

    *name.lock() = "Grace".to_string();
    rt.detect_changes(view).unwrap();
    assert_eq!(renderer.property(img, "alt"), Some(BindingValue::from("Photo of Grace")));
}
