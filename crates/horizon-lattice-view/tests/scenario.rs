//! End-to-end test: a component with an input, a row container and a view
//! query, driven through several change detection passes.

use std::sync::Arc;

use horizon_lattice_view::{
    ContainerLocation, CssSelector, Directive, DirectiveDef, HookResult, LifecycleHooks, MemoryRenderer,
    QueryFlags, QueryList, QueryMetadata, QueryPredicate, RenderFlags, Renderer, Runtime, RuntimeConfigBuilder,
    SimpleChanges, TemplateKind, ViewId, ViewTemplate, ViewTreeDebug,
};
use parking_lot::Mutex;

type Log = Arc<Mutex<Vec<String>>>;
type Rows = Arc<Mutex<Option<Arc<QueryList>>>>;

struct TodoList {
    log: Log,
    rows: Rows,
}

impl Directive for TodoList {
    fn on_changes(&self, _rt: &mut Runtime, changes: &SimpleChanges) -> HookResult {
        for (name, change) in changes {
            let first = if change.first_change { ",first" } else { "" };
            self.log.lock().push(format!("{name}={}{first}", change.current));
        }
        Ok(())
    }

    fn after_view_checked(&self, _rt: &mut Runtime) -> HookResult {
        let count = self.rows.lock().as_ref().map_or(0, |rows| rows.len());
        self.log.lock().push(format!("checked:{count}"));
        Ok(())
    }
}

/// Logs its init and destroy hooks.
struct Logged {
    name: &'static str,
    log: Log,
}

impl Directive for Logged {
    fn on_init(&self, _rt: &mut Runtime) -> HookResult {
        self.log.lock().push(format!("{}.on_init", self.name));
        Ok(())
    }

    fn on_destroy(&self, _rt: &mut Runtime) -> HookResult {
        self.log.lock().push(format!("{}.on_destroy", self.name));
        Ok(())
    }
}

struct App {
    renderer: Arc<MemoryRenderer>,
    rt: Runtime,
    host: horizon_lattice_view::NodeHandle,
    root: ViewId,
    title: Arc<Mutex<String>>,
    log: Log,
}

impl App {
    fn todo_view(&mut self) -> ViewId {
        let component = self.rt.component_at_node(self.root, 2).unwrap().unwrap();
        self.rt.component_view_by_instance(&component).unwrap().unwrap()
    }

    fn add_row(&mut self, label: &str) -> ViewId {
        let location = ContainerLocation::new(self.todo_view(), 1);
        let template = self
            .rt
            .template_ref(location.view, location.node)
            .unwrap()
            .template()
            .unwrap()
            .clone();
        let row = self
            .rt
            .create_embedded_view(&template, Some(Arc::new(label.to_string())))
            .unwrap();
        self.rt.insert_view(location, row, None).unwrap();
        row
    }

    fn html(&self) -> String {
        self.renderer.serialize(self.host)
    }
}

/// `<h1>{{title}}</h1><x-todo-list [title]="title"/>`, where the list
/// renders `<ul><ng-template let-label><li #item>{{label}}</li></ng-template></ul>`.
fn setup() -> App {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let renderer = Arc::new(MemoryRenderer::new());
    let config = RuntimeConfigBuilder::new().dev_mode(true).build();
    let mut rt = Runtime::with_config(renderer.clone(), config);
    let log = Log::default();
    let rows = Rows::default();

    let row = ViewTemplate::builder("Row", TemplateKind::Embedded)
        .decls(2)
        .vars(1)
        .template(|rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element_start(0, "li", None, &[("item", "")])?;
                rt.text(1, "")?;
                rt.element_end()?;
            }
            if flags.contains(RenderFlags::UPDATE) {
                let label = rt
                    .context()
                    .and_then(|c| c.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                rt.advance(1)?;
                rt.text_interpolate(label)?;
            }
            Ok(())
        })
        .build();
    let query_rows = rows.clone();
    let list_view = ViewTemplate::builder("TodoList", TemplateKind::Component)
        .decls(2)
        .view_query(move |rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                let metadata = QueryMetadata::new(QueryPredicate::names(["item"]), QueryFlags::DESCENDANTS);
                *query_rows.lock() = Some(rt.view_query(metadata)?);
            }
            if flags.contains(RenderFlags::UPDATE) {
                let list = rt.load_query()?;
                rt.query_refresh(&list)?;
            }
            Ok(())
        })
        .template(move |rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element_start(0, "ul", None, &[])?;
                rt.template(1, &row, None, None, &[])?;
                rt.element_end()?;
            }
            Ok(())
        })
        .build();
    let (hook_log, hook_rows) = (log.clone(), rows.clone());
    let todo_list = DirectiveDef::builder("TodoList", move || {
        Arc::new(TodoList {
            log: hook_log.clone(),
            rows: hook_rows.clone(),
        })
    })
    .selector(CssSelector::element("x-todo-list"))
    .component(list_view)
    .input("title")
    .hooks(LifecycleHooks::ON_CHANGES | LifecycleHooks::AFTER_VIEW_CHECKED)
    .build();

    let title = Arc::new(Mutex::new("Todos".to_string()));
    let bound = title.clone();
    let app = ViewTemplate::builder("App", TemplateKind::Root)
        .decls(3)
        .vars(2)
        .directive(todo_list)
        .template(move |rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element_start(0, "h1", None, &[])?;
                rt.text(1, "")?;
                rt.element_end()?;
                rt.element(2, "x-todo-list", None, &[])?;
            }
            if flags.contains(RenderFlags::UPDATE) {
                let title = bound.lock().clone();
                rt.advance(1)?;
                rt.text_interpolate(title.clone())?;
                rt.advance(1)?;
                rt.property("title", title)?;
            }
            Ok(())
        })
        .build();

    let host = renderer.create_element("app", None);
    let root = rt.create_root_view(&app, Some(host), None).unwrap();
    App {
        renderer,
        rt,
        host,
        root,
        title,
        log,
    }
}

#[test]
fn test_todo_list_lifecycle() {
    let mut app = setup();
    app.rt.detect_changes(app.root).unwrap();
    assert_eq!(
        app.html(),
        "<app><h1>Todos</h1><x-todo-list><ul><!--container--></ul></x-todo-list></app>"
    );
    assert_eq!(*app.log.lock(), vec!["title=Todos,first", "checked:0"]);

    app.add_row("milk");
    app.add_row("eggs");
    app.rt.detect_changes(app.root).unwrap();
    assert_eq!(
        app.html(),
        "<app><h1>Todos</h1><x-todo-list><ul><li>milk</li><li>eggs</li><!--container--></ul></x-todo-list></app>"
    );
    assert_eq!(app.log.lock().last().map(String::as_str), Some("checked:2"));

    *app.title.lock() = "Groceries".to_string();
    app.log.lock().clear();
    app.rt.detect_changes(app.root).unwrap();
    assert!(app.html().starts_with("<app><h1>Groceries</h1>"));
    assert_eq!(*app.log.lock(), vec!["title=Groceries", "checked:2"]);

    let location = ContainerLocation::new(app.todo_view(), 1);
    app.rt.remove_view(location, 0).unwrap();
    app.rt.detect_changes(app.root).unwrap();
    assert_eq!(
        app.html(),
        "<app><h1>Groceries</h1><x-todo-list><ul><li>eggs</li><!--container--></ul></x-todo-list></app>"
    );
    assert_eq!(app.log.lock().last().map(String::as_str), Some("checked:1"));
    assert_eq!(app.rt.frames().depth(), 0);
}

#[test]
fn test_view_tree_lists_component_and_rows() {
    let mut app = setup();
    app.add_row("milk");
    app.add_row("eggs");

    let tree = ViewTreeDebug::new().format_subtree(&app.rt, app.root).unwrap();
    let lines: Vec<&str> = tree.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "App");
    assert!(lines[1].ends_with("TodoList"));
    assert!(lines[2].ends_with("Row"));
    assert!(lines[3].ends_with("Row"));

    let all = ViewTreeDebug::new().format_all(&app.rt).unwrap();
    assert!(all.starts_with("View Tree (4 total views):"));
}

#[test]
fn test_destroying_the_app_destroys_everything() {
    let mut app = setup();
    app.add_row("milk");
    app.rt.detect_changes(app.root).unwrap();

    app.rt.destroy_view(app.root).unwrap();
    assert!(app.rt.views().is_empty());
    assert!(app.rt.contexts().is_empty());
    assert_eq!(app.html(), "<app></app>");
}

/// `<x-host><ng-template><x-child/></ng-template></x-host>`, where `x-host`
/// queries its `Child` components and `x-child` is a component.
#[test]
fn test_content_query_follows_removed_children() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let renderer = Arc::new(MemoryRenderer::new());
    let mut rt = Runtime::new(renderer.clone());
    let log = Log::default();

    let child_view = ViewTemplate::builder("ChildView", TemplateKind::Component).build();
    let child_log = log.clone();
    let child = DirectiveDef::builder("Child", move || {
        Arc::new(Logged {
            name: "Child",
            log: child_log.clone(),
        })
    })
    .selector(CssSelector::element("x-child"))
    .component(child_view)
    .hooks(LifecycleHooks::ON_DESTROY)
    .build();
    let row = ViewTemplate::builder("ChildRow", TemplateKind::Embedded)
        .decls(1)
        .directive(child)
        .template(|rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element(0, "x-child", None, &[])?;
            }
            Ok(())
        })
        .build();

    let (host_log, query_log) = (log.clone(), log.clone());
    let host = DirectiveDef::builder("Host", move || {
        Arc::new(Logged {
            name: "Host",
            log: host_log.clone(),
        })
    })
    .selector(CssSelector::element("x-host"))
    .hooks(LifecycleHooks::ON_INIT | LifecycleHooks::ON_DESTROY)
    .content_queries(move |rt, flags, _instance, slot| {
        if flags.contains(RenderFlags::CREATE) {
            let metadata = QueryMetadata::new(
                QueryPredicate::Token(horizon_lattice_view::CapabilityToken::named("Child")),
                QueryFlags::DESCENDANTS,
            );
            rt.content_query(slot, metadata)?;
        }
        if flags.contains(RenderFlags::UPDATE) {
            let list = rt.load_query()?;
            let changed = rt.query_refresh(&list)?;
            query_log.lock().push(format!("refresh:{changed}:{}", list.len()));
        }
        Ok(())
    })
    .build();
    let page = ViewTemplate::builder("Page", TemplateKind::Root)
        .decls(2)
        .directive(host)
        .template(move |rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element_start(0, "x-host", None, &[])?;
                rt.template(1, &row, None, None, &[])?;
                rt.element_end()?;
            }
            Ok(())
        })
        .build();

    let root = rt.create_root_view(&page, None, None).unwrap();
    let location = ContainerLocation::new(root, 1);
    let template = rt.template_ref(root, 1).unwrap().template().unwrap().clone();
    for _ in 0..2 {
        let view = rt.create_embedded_view(&template, None).unwrap();
        rt.insert_view(location, view, None).unwrap();
    }

    rt.refresh_view(root).unwrap();
    assert_eq!(*log.lock(), vec!["Host.on_init", "refresh:true:2"]);

    rt.refresh_view(root).unwrap();
    assert_eq!(log.lock().last().map(String::as_str), Some("refresh:false:2"));

    log.lock().clear();
    rt.remove_view(location, 0).unwrap();
    rt.refresh_view(root).unwrap();
    assert_eq!(*log.lock(), vec!["Child.on_destroy", "refresh:true:1"]);

    log.lock().clear();
    rt.destroy_view(root).unwrap();
    assert_eq!(*log.lock(), vec!["Child.on_destroy", "Host.on_destroy"]);
}
