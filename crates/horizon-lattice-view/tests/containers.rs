//! Integration tests for view containers and embedded views.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use horizon_lattice_view::{
    ContainerLocation, MemoryRenderer, RenderFlags, Renderer, Runtime, TemplateKind, ViewError, ViewFlags,
    ViewId, ViewTemplate,
};

struct Fixture {
    renderer: Arc<MemoryRenderer>,
    rt: Runtime,
    host: horizon_lattice_view::NodeHandle,
    root: ViewId,
    updates: Arc<AtomicUsize>,
}

impl Fixture {
    fn location(&self) -> ContainerLocation {
        ContainerLocation::new(self.root, 1)
    }

    fn row(&mut self, label: &str) -> ViewId {
        let template_ref = self.rt.template_ref(self.root, 1).unwrap().template().unwrap().clone();
        self.rt
            .create_embedded_view(&template_ref, Some(Arc::new(label.to_string())))
            .unwrap()
    }

    fn html(&self) -> String {
        self.renderer.serialize(self.host)
    }
}

/// `<ul><ng-template let-label><li>{{label}}</li></ng-template></ul>`
fn setup() -> Fixture {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let renderer = Arc::new(MemoryRenderer::new());
    let mut rt = Runtime::new(renderer.clone());
    let updates = Arc::new(AtomicUsize::new(0));
    let counter = updates.clone();
    let row = ViewTemplate::builder("Row", TemplateKind::Embedded)
        .decls(2)
        .vars(1)
        .template(move |rt, flags| {
            if flags.contains(RenderFlags::CREATE) {
                rt.element_start(0, "li", None, &[])?;
                rt.text(1, "")?;
                rt.element_end()?;
            }
            if flags.contains(RenderFlags::UPDATE) {
                counter.fetch_add(1, Ordering::SeqCst);
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
    let list = ViewTemplate::builder("List", TemplateKind::Root)
        .decls(2)
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
    Fixture {
        renderer,
        rt,
        host,
        root,
        updates,
    }
}

#[test]
fn test_insert_renders_before_anchor() {
    let mut f = setup();
    assert_eq!(f.html(), "<host><ul><!--container--></ul></host>");

    for label in ["a", "b", "c"] {
        let view = f.row(label);
        let location = f.location();
        f.rt.insert_view(location, view, None).unwrap();
    }
    f.rt.refresh_view(f.root).unwrap();
    assert_eq!(
        f.html(),
        "<host><ul><li>a</li><li>b</li><li>c</li><!--container--></ul></host>"
    );

    let first = f.row("z");
    let location = f.location();
    assert_eq!(f.rt.insert_view(location, first, Some(0)).unwrap(), 0);
    f.rt.refresh_view(f.root).unwrap();
    assert_eq!(
        f.html(),
        "<host><ul><li>z</li><li>a</li><li>b</li><li>c</li><!--container--></ul></host>"
    );
}

#[test]
fn test_move_and_detach_keep_document_order() {
    let mut f = setup();
    let location = f.location();
    let rows: Vec<ViewId> = ["a", "b", "c"]
        .into_iter()
        .map(|label| {
            let view = f.row(label);
            f.rt.insert_view(location, view, None).unwrap();
            view
        })
        .collect();
    f.rt.refresh_view(f.root).unwrap();

    f.rt.move_view(rows[2], location, Some(0)).unwrap();
    assert_eq!(f.rt.container_views(location).unwrap(), vec![rows[2], rows[0], rows[1]]);
    assert_eq!(
        f.html(),
        "<host><ul><li>c</li><li>a</li><li>b</li><!--container--></ul></host>"
    );

    let detached = f.rt.detach_view(location, 1).unwrap();
    assert_eq!(detached, Some(rows[0]));
    assert_eq!(f.html(), "<host><ul><li>c</li><li>b</li><!--container--></ul></host>");
    let flags = f.rt.view(rows[0]).unwrap().flags();
    assert!(!flags.contains(ViewFlags::ATTACHED));
    assert!(f.rt.view(rows[0]).unwrap().parent().is_none());

    // Detached views survive and can be inserted again.
    f.rt.insert_view(location, rows[0], None).unwrap();
    assert_eq!(
        f.html(),
        "<host><ul><li>c</li><li>b</li><li>a</li><!--container--></ul></host>"
    );
    assert_eq!(f.rt.detach_view(location, 10).unwrap(), None);
}

#[test]
fn test_detached_views_are_not_refreshed() {
    let mut f = setup();
    let location = f.location();
    for label in ["a", "b"] {
        let view = f.row(label);
        f.rt.insert_view(location, view, None).unwrap();
    }
    f.rt.refresh_view(f.root).unwrap();
    assert_eq!(f.updates.load(Ordering::SeqCst), 2);

    f.rt.detach_view(location, 0).unwrap();
    f.rt.refresh_view(f.root).unwrap();
    assert_eq!(f.updates.load(Ordering::SeqCst), 3);
}

#[test]
fn test_remove_destroys_the_view() {
    let mut f = setup();
    let location = f.location();
    let view = f.row("a");
    f.rt.insert_view(location, view, None).unwrap();
    let count = f.rt.views().len();

    f.rt.remove_view(location, 0).unwrap();
    assert!(matches!(f.rt.view(view), Err(ViewError::InvalidView(_))));
    assert_eq!(f.rt.views().len(), count - 1);
    assert!(f.rt.container_views(location).unwrap().is_empty());
    assert_eq!(f.html(), "<host><ul><!--container--></ul></host>");
}

#[test]
fn test_non_container_slots_are_rejected() {
    let mut f = setup();
    assert!(matches!(
        f.rt.template_ref(f.root, 0),
        Err(ViewError::ContainerExpected { index: 0, .. })
    ));
    let view = f.row("a");
    let err = f
        .rt
        .insert_view(ContainerLocation::new(f.root, 0), view, None)
        .unwrap_err();
    assert!(matches!(err, ViewError::ContainerExpected { .. }));
    assert!(f.rt.container_views(ContainerLocation::new(f.root, 0)).is_err());
}

#[test]
fn test_embedded_view_reads_its_own_context() {
    let mut f = setup();
    let location = f.location();
    let view = f.row("hello");
    f.rt.insert_view(location, view, None).unwrap();
    f.rt.detect_changes(f.root).unwrap();
    assert_eq!(f.html(), "<host><ul><li>hello</li><!--container--></ul></host>");
    assert_eq!(
        f.rt.view(view).unwrap().declaration_container(),
        Some(location)
    );
    assert_eq!(f.rt.frames().depth(), 0);
}
