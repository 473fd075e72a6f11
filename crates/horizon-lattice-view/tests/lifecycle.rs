//! Integration tests for lifecycle hook ordering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use horizon_lattice_view::{
    ContainerLocation, CssSelector, Directive, DirectiveDef, HookResult, InitPhase, LifecycleHook,
    LifecycleHooks, MemoryRenderer, RenderFlags, Renderer, Runtime, SimpleChanges, TemplateKind,
    ViewError, ViewTemplate,
};
use parking_lot::Mutex;

type Log = Arc<Mutex<Vec<String>>>;

fn setup() -> (Arc<MemoryRenderer>, Runtime) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let renderer = Arc::new(MemoryRenderer::new());
    let rt = Runtime::new(renderer.clone());
    (renderer, rt)
}

struct Recorder {
    name: &'static str,
    log: Log,
    reenter: AtomicBool,
    fail_init: bool,
}

impl Recorder {
    fn push(&self, entry: impl AsRef<str>) {
        self.log.lock().push(format!("{}.{}", self.name, entry.as_ref()));
    }
}

impl Directive for Recorder {
    fn on_changes(&self, _rt: &mut Runtime, changes: &SimpleChanges) -> HookResult {
        for (name, change) in changes {
            let first = if change.first_change { ",first" } else { "" };
            self.push(format!("on_changes({name}={}{first})", change.current));
        }
        Ok(())
    }

    fn on_init(&self, rt: &mut Runtime) -> HookResult {
        self.push("on_init");
        if self.fail_init {
            return Err("init failed".into());
        }
        if self.reenter.swap(false, Ordering::SeqCst) {
            let view = rt.current_view().ok_or("no current view")?;
            rt.refresh_view(view)?;
        }
        Ok(())
    }

    fn do_check(&self, _rt: &mut Runtime) -> HookResult {
        self.push("do_check");
        Ok(())
    }

    fn after_content_init(&self, _rt: &mut Runtime) -> HookResult {
        self.push("after_content_init");
        Ok(())
    }

    fn after_content_checked(&self, _rt: &mut Runtime) -> HookResult {
        self.push("after_content_checked");
        Ok(())
    }

    fn after_view_init(&self, _rt: &mut Runtime) -> HookResult {
        self.push("after_view_init");
        Ok(())
    }

    fn after_view_checked(&self, _rt: &mut Runtime) -> HookResult {
        self.push("after_view_checked");
        Ok(())
    }

    fn on_destroy(&self, _rt: &mut Runtime) -> HookResult {
        self.push("on_destroy");
        Ok(())
    }
}

const ALL_BUT_CHANGES: LifecycleHooks = LifecycleHooks::ON_INIT
    .union(LifecycleHooks::DO_CHECK)
    .union(LifecycleHooks::AFTER_CONTENT_INIT)
    .union(LifecycleHooks::AFTER_CONTENT_CHECKED)
    .union(LifecycleHooks::AFTER_VIEW_INIT)
    .union(LifecycleHooks::AFTER_VIEW_CHECKED);

fn recorder_def(
    name: &'static str,
    tag: &str,
    hooks: LifecycleHooks,
    log: &Log,
    reenter: bool,
) -> Arc<DirectiveDef> {
    let log = log.clone();
    DirectiveDef::builder(name, move || {
        Arc::new(Recorder {
            name,
            log: log.clone(),
            reenter: AtomicBool::new(reenter),
            fail_init: false,
        })
    })
    .selector(CssSelector::element(tag))
    .hooks(hooks)
    .build()
}

/// `<x-a><x-b></x-b></x-a>` with directive A on the outer and B on the
/// inner element.
fn nested_template(log: &Log, reenter: bool) -> ViewTemplate {
    ViewTemplate::builder("Nested", TemplateKind::Root)
        .decls(2)
        .directive(recorder_def("A", "x-a", ALL_BUT_CHANGES, log, reenter))
        .directive(recorder_def("B", "x-b", ALL_BUT_CHANGES, log, false))
        .template(|rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element_start(0, "x-a", None, &[])?;
                rt.element(1, "x-b", None, &[])?;
                rt.element_end()?;
            }
            Ok(())
        })
        .build()
}

fn count(log: &Log, entry: &str) -> usize {
    log.lock().iter().filter(|e| *e == entry).count()
}

#[test]
fn test_hooks_run_in_global_order() {
    let (_, mut rt) = setup();
    let log = Log::default();
    let template = nested_template(&log, false);
    let view = rt.create_root_view(&template, None, None).unwrap();
    assert!(log.lock().is_empty());

    rt.refresh_view(view).unwrap();
    assert_eq!(
        *log.lock(),
        vec![
            "A.on_init",
            "A.do_check",
            "B.on_init",
            "B.do_check",
            "B.after_content_init",
            "B.after_content_checked",
            "A.after_content_init",
            "A.after_content_checked",
            "B.after_view_init",
            "B.after_view_checked",
            "A.after_view_init",
            "A.after_view_checked",
        ]
    );
    assert_eq!(rt.view(view).unwrap().init_phase(), InitPhase::Completed);
}

#[test]
fn test_later_refreshes_run_check_hooks_only() {
    let (_, mut rt) = setup();
    let log = Log::default();
    let template = nested_template(&log, false);
    let view = rt.create_root_view(&template, None, None).unwrap();
    rt.refresh_view(view).unwrap();
    log.lock().clear();

    rt.refresh_view(view).unwrap();
    assert_eq!(
        *log.lock(),
        vec![
            "A.do_check",
            "B.do_check",
            "B.after_content_checked",
            "A.after_content_checked",
            "B.after_view_checked",
            "A.after_view_checked",
        ]
    );
}

#[test]
fn test_check_no_changes_runs_no_hooks() {
    let (_, mut rt) = setup();
    let log = Log::default();
    let template = nested_template(&log, false);
    let view = rt.create_root_view(&template, None, None).unwrap();
    rt.refresh_view(view).unwrap();
    let before = log.lock().len();

    rt.check_no_changes(view).unwrap();
    assert_eq!(log.lock().len(), before);
    assert_eq!(rt.frames().depth(), 0);
}

#[test]
fn test_init_hooks_run_once_under_reentrant_refresh() {
    let (_, mut rt) = setup();
    let log = Log::default();
    let template = nested_template(&log, true);
    let view = rt.create_root_view(&template, None, None).unwrap();

    rt.refresh_view(view).unwrap();
    for entry in [
        "A.on_init",
        "B.on_init",
        "A.after_content_init",
        "B.after_content_init",
        "A.after_view_init",
        "B.after_view_init",
    ] {
        assert_eq!(count(&log, entry), 1, "{entry} ran more than once");
    }
    assert_eq!(log.lock()[0], "A.on_init");
    assert_eq!(rt.view(view).unwrap().init_phase(), InitPhase::Completed);
    assert_eq!(rt.frames().depth(), 0);

    log.lock().clear();
    rt.refresh_view(view).unwrap();
    assert_eq!(count(&log, "A.on_init"), 0);
    assert_eq!(count(&log, "A.do_check"), 1);
}

#[test]
fn test_on_changes_precedes_on_init() {
    let (_, mut rt) = setup();
    let log = Log::default();
    let value = Arc::new(Mutex::new(1i64));
    let bound = value.clone();
    let recorder_log = log.clone();
    let def = DirectiveDef::builder("Field", move || {
        Arc::new(Recorder {
            name: "Field",
            log: recorder_log.clone(),
            reenter: AtomicBool::new(false),
            fail_init: false,
        })
    })
    .selector(CssSelector::element("x-field"))
    .input("value")
    .hooks(LifecycleHooks::ON_CHANGES | LifecycleHooks::ON_INIT | LifecycleHooks::DO_CHECK)
    .build();
    let template = ViewTemplate::builder("Form", TemplateKind::Root)
        .decls(1)
        .vars(1)
        .directive(def)
        .template(move |rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element(0, "x-field", None, &[])?;
            }
            if flags.contains(RenderFlags::UPDATE) {
                let current = *bound.lock();
                rt.property("value", current)?;
            }
            Ok(())
        })
        .build();
    let view = rt.create_root_view(&template, None, None).unwrap();

    rt.refresh_view(view).unwrap();
    assert_eq!(
        *log.lock(),
        vec!["Field.on_changes(value=1,first)", "Field.on_init", "Field.do_check"]
    );

    log.lock().clear();
    rt.refresh_view(view).unwrap();
    assert_eq!(*log.lock(), vec!["Field.do_check"]);

    log.lock().clear();
    *value.lock() = 2;
    rt.refresh_view(view).unwrap();
    assert_eq!(*log.lock(), vec!["Field.on_changes(value=2)", "Field.do_check"]);
}

#[test]
fn test_component_view_hooks_nest_inside_host_hooks() {
    let (renderer, mut rt) = setup();
    let log = Log::default();
    let hooks = LifecycleHooks::ON_INIT | LifecycleHooks::AFTER_VIEW_INIT;
    let card = ViewTemplate::builder("Card", TemplateKind::Component)
        .decls(1)
        .directive(recorder_def("Inner", "x-inner", hooks, &log, false))
        .template(|rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element(0, "x-inner", None, &[])?;
            }
            Ok(())
        })
        .build();
    let card_log = log.clone();
    let card_def = DirectiveDef::builder("Card", move || {
        Arc::new(Recorder {
            name: "Card",
            log: card_log.clone(),
            reenter: AtomicBool::new(false),
            fail_init: false,
        })
    })
    .selector(CssSelector::element("x-card"))
    .component(card)
    .hooks(hooks)
    .build();
    let app = ViewTemplate::builder("App", TemplateKind::Root)
        .decls(1)
        .directive(card_def)
        .template(|rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element(0, "x-card", None, &[])?;
            }
            Ok(())
        })
        .build();
    let host = renderer.create_element("app", None);
    let view = rt.create_root_view(&app, Some(host), None).unwrap();
    rt.refresh_view(view).unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "Card.on_init",
            "Inner.on_init",
            "Inner.after_view_init",
            "Card.after_view_init",
        ]
    );
    assert_eq!(renderer.serialize(host), "<app><x-card><x-inner></x-inner></x-card></app>");
}

#[test]
fn test_destroy_runs_children_first() {
    let (renderer, mut rt) = setup();
    let log = Log::default();
    let row = ViewTemplate::builder("Row", TemplateKind::Embedded)
        .decls(1)
        .directive(recorder_def("Item", "li", LifecycleHooks::ON_DESTROY, &log, false))
        .template(|rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element(0, "li", None, &[])?;
            }
            Ok(())
        })
        .build();
    let list = ViewTemplate::builder("List", TemplateKind::Root)
        .decls(2)
        .directive(recorder_def("List", "ul", LifecycleHooks::ON_DESTROY, &log, false))
        .template(move |rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element_start(0, "ul", None, &[])?;
                rt.template(1, &row, None, None, &[])?;
                rt.element_end()?;
            }
            Ok(())
        })
        .build();
    let host = renderer.create_element("host", None);
    let root = rt.create_root_view(&list, Some(host), None).unwrap();
    let template_ref = rt.template_ref(root, 1).unwrap().template().unwrap().clone();
    let item = rt.create_embedded_view(&template_ref, None).unwrap();
    rt.insert_view(ContainerLocation::new(root, 1), item, None).unwrap();
    rt.refresh_view(root).unwrap();

    rt.destroy_view(root).unwrap();
    assert_eq!(*log.lock(), vec!["Item.on_destroy", "List.on_destroy"]);
    assert!(rt.views().is_empty());
    assert!(matches!(rt.view(item), Err(ViewError::InvalidView(_))));
    assert_eq!(renderer.serialize(host), "<host></host>");
}

#[test]
fn test_failing_hook_reports_directive_and_hook() {
    let (_, mut rt) = setup();
    let log = Log::default();
    let failing_log = log.clone();
    let def = DirectiveDef::builder("Broken", move || {
        Arc::new(Recorder {
            name: "Broken",
            log: failing_log.clone(),
            reenter: AtomicBool::new(false),
            fail_init: true,
        })
    })
    .selector(CssSelector::element("x-broken"))
    .hooks(LifecycleHooks::ON_INIT)
    .build();
    let template = ViewTemplate::builder("Host", TemplateKind::Root)
        .decls(1)
        .directive(def)
        .template(|rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element(0, "x-broken", None, &[])?;
            }
            Ok(())
        })
        .build();
    let view = rt.create_root_view(&template, None, None).unwrap();

    let err = rt.refresh_view(view).unwrap_err();
    match err {
        ViewError::Hook { directive, hook, .. } => {
            assert_eq!(directive, "Broken");
            assert_eq!(hook, LifecycleHook::OnInit);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(rt.frames().depth(), 0);

    // A failed run-once hook is not retried.
    rt.refresh_view(view).unwrap();
    assert_eq!(count(&log, "Broken.on_init"), 1);
}
