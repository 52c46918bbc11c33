//! Two replicas kept in sync by exchanging encoded updates.

use std::cell::RefCell;
use std::rc::Rc;

use jupyter_ydoc::{
    CellChange, CellContent, DeltaOp, DocOptions, MapChange, NotebookChange, NotebookOptions,
    SharedDocument, YFile, YNotebook,
};
use serde_json::json;
use yrs::{Map, MapPrelim};

fn replica(client_id: u64) -> YNotebook {
    YNotebook::with_options(
        NotebookOptions::new().with_doc_options(DocOptions::new().with_client_id(client_id)),
    )
}

/// Send each side what the other is missing.
fn sync(a: &YNotebook, b: &YNotebook) {
    let to_b = a.encode_diff(&b.state_vector()).unwrap();
    let to_a = b.encode_diff(&a.state_vector()).unwrap();
    b.apply_update(&to_b).unwrap();
    a.apply_update(&to_a).unwrap();
}

fn record(notebook: &YNotebook) -> Rc<RefCell<Vec<NotebookChange>>> {
    let changes = Rc::new(RefCell::new(Vec::new()));
    let sink = changes.clone();
    notebook
        .changed()
        .connect(move |c: &NotebookChange| sink.borrow_mut().push(c.clone()));
    changes
}

#[test]
fn test_remote_insert_creates_models() {
    let a = replica(1);
    let b = replica(2);
    let changes = record(&b);

    let cell = a.add_cell(CellContent::markdown("# shared")).unwrap();
    sync(&a, &b);

    assert_eq!(b.cell_count(), 1);
    let remote = b.get_cell(0).unwrap();
    assert_eq!(remote.id(), cell.id());
    assert_eq!(remote.source(), "# shared");
    assert!(!remote.is_standalone());

    let changes = changes.borrow();
    assert_eq!(changes.len(), 1);
    match changes[0].cells_change.as_deref() {
        Some([DeltaOp::Insert(models)]) => assert_eq!(models, &vec![remote]),
        other => panic!("unexpected delta {other:?}"),
    }
}

#[test]
fn test_remote_edits_reach_cell_listeners() {
    let a = replica(1);
    let b = replica(2);
    a.add_cell(CellContent::code("x")).unwrap();
    sync(&a, &b);

    let remote = b.get_cell(0).unwrap();
    let changes = Rc::new(RefCell::new(Vec::new()));
    let sink = changes.clone();
    remote
        .changed()
        .connect(move |c: &CellChange| sink.borrow_mut().push(c.clone()));

    a.get_cell(0).unwrap().update_source(1, 1, " = 1").unwrap();
    sync(&a, &b);

    assert_eq!(remote.source(), "x = 1");
    assert_eq!(
        changes.borrow()[0].source_change,
        Some(vec![DeltaOp::Retain(1), DeltaOp::Insert(" = 1".into())])
    );
}

#[test]
fn test_remote_delete_disposes_model() {
    let a = replica(1);
    let b = replica(2);
    a.add_cell(CellContent::raw("gone")).unwrap();
    sync(&a, &b);
    let remote = b.get_cell(0).unwrap();

    a.delete_cell(0).unwrap();
    sync(&a, &b);

    assert_eq!(b.cell_count(), 0);
    assert!(remote.is_disposed());
}

#[test]
fn test_concurrent_stream_appends_merge() {
    let a = replica(1);
    let b = replica(2);
    let cell = a
        .add_cell(CellContent::code("print()").with_outputs(vec![json!({
            "output_type": "stream",
            "name": "stdout",
            "text": "start\n"
        })]))
        .unwrap();
    sync(&a, &b);
    let remote = b.get_cell(0).unwrap();

    cell.append_stream_output(0, "from a\n").unwrap();
    remote.append_stream_output(0, "from b\n").unwrap();
    sync(&a, &b);

    let text_a = cell.outputs()[0]["text"].as_str().unwrap().to_string();
    let text_b = remote.outputs()[0]["text"].as_str().unwrap().to_string();
    assert_eq!(text_a, text_b);
    assert!(text_a.starts_with("start\n"));
    assert!(text_a.contains("from a\n"));
    assert!(text_a.contains("from b\n"));
}

#[test]
fn test_remote_changes_are_not_undoable_locally() {
    let a = replica(1);
    let b = replica(2);
    a.add_cell(CellContent::code("")).unwrap();
    sync(&a, &b);

    assert!(a.can_undo());
    assert!(!b.can_undo());
}

#[test]
fn test_concurrent_metadata_keys() {
    let a = replica(1);
    let b = replica(2);
    a.set_metadata("kernelspec", json!({"name": "python3"}))
        .unwrap();
    sync(&a, &b);

    a.set_metadata("a", json!(1)).unwrap();
    b.set_metadata("b", json!(2)).unwrap();
    sync(&a, &b);

    assert_eq!(a.metadata(), b.metadata());
    assert_eq!(a.get_metadata("b"), Some(json!(2)));
    assert_eq!(b.get_metadata("a"), Some(json!(1)));
}

#[test]
fn test_remote_metadata_map_swap() {
    let a = replica(1);
    let b = replica(2);
    a.set_metadata("kernelspec", json!({"name": "python3"}))
        .unwrap();
    sync(&a, &b);
    let changes = record(&b);

    a.transact(|txn| {
        let swapped = a.ymeta().insert(txn, "metadata", MapPrelim::default());
        swapped.insert(txn, "language_info", "python");
    })
    .unwrap();
    sync(&a, &b);

    assert_eq!(b.metadata(), a.metadata());
    assert_eq!(b.get_metadata("kernelspec"), None);
    let changes = changes.borrow();
    assert_eq!(changes.len(), 1);
    assert_eq!(
        changes[0].metadata_change,
        Some(vec![
            MapChange::delete("kernelspec", json!({"name": "python3"})),
            MapChange::add("language_info", json!("python")),
        ])
    );
}

#[test]
fn test_file_replicas() {
    let a = YFile::with_options(DocOptions::new().with_client_id(1));
    let b = YFile::with_options(DocOptions::new().with_client_id(2));
    a.set_source("hello").unwrap();
    b.apply_update(&a.encode_state_as_update()).unwrap();

    b.update_source(5, 5, " world").unwrap();
    a.apply_update(&b.encode_diff(&a.state_vector()).unwrap())
        .unwrap();

    assert_eq!(a.source(), "hello world");
    assert_eq!(a.version(), "1.0.0");
}
