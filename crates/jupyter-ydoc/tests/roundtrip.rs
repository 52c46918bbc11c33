//! Notebook JSON in, notebook JSON out.

use std::cell::RefCell;
use std::rc::Rc;

use jupyter_ydoc::{
    CellContent, FileChange, NotebookContent, SharedDocument, YCell, YFile, YNotebook,
};
use serde_json::{json, Value};

const NOTEBOOK: &str = r##"{
  "cells": [
    {
      "id": "intro",
      "cell_type": "markdown",
      "source": ["# Analysis\n", "Some **text**"],
      "metadata": {"tags": ["header"]},
      "attachments": {"logo.png": {"image/png": "iVBORw0KGgo="}}
    },
    {
      "id": "load",
      "cell_type": "code",
      "source": "import pandas as pd\ndf = pd.read_csv('data.csv')",
      "metadata": {"collapsed": true},
      "execution_count": 3,
      "outputs": [
        {"output_type": "stream", "name": "stdout", "text": ["loading\n", "done\n"]},
        {
          "output_type": "execute_result",
          "execution_count": 3,
          "data": {"text/plain": "42"},
          "metadata": {}
        }
      ]
    },
    {
      "id": "notes",
      "cell_type": "raw",
      "source": "",
      "metadata": {}
    }
  ],
  "metadata": {
    "kernelspec": {"name": "python3", "display_name": "Python 3", "language": "python"},
    "language_info": {"name": "python", "version": "3.12.1"}
  },
  "nbformat": 4,
  "nbformat_minor": 5
}"##;

fn load() -> (YNotebook, NotebookContent) {
    let content = NotebookContent::from_json_str(NOTEBOOK).unwrap();
    (YNotebook::create(&content).unwrap(), content)
}

#[test]
fn test_load_fixture() {
    let (notebook, _) = load();

    assert_eq!(notebook.cell_count(), 3);
    let cells = notebook.cells();
    assert_eq!(cells[0].id(), "intro");
    assert_eq!(cells[0].source(), "# Analysis\nSome **text**");
    assert!(cells[0].attachments().is_some());

    let code = &cells[1];
    assert_eq!(code.execution_count(), Some(3));
    assert_eq!(code.execution_state().as_deref(), Some("idle"));
    assert_eq!(code.outputs()[0]["text"], "loading\ndone\n");
    assert_eq!(
        code.get_metadata("jupyter"),
        Some(json!({"outputs_hidden": true}))
    );

    assert_eq!(
        notebook.get_metadata("kernelspec").unwrap()["name"],
        json!("python3")
    );
}

#[test]
fn test_round_trip_is_stable() {
    let (notebook, _) = load();
    let first = notebook.to_json();

    notebook.from_json(&first).unwrap();
    let second = notebook.to_json();

    assert_eq!(first, second);
    assert_eq!(second.nbformat, 4);
    assert_eq!(second.nbformat_minor, 5);
    let code = second.cells[1].to_value();
    assert!(code.get("execution_state").is_none());
    assert_eq!(code["outputs"][1]["data"]["text/plain"], json!("42"));
    assert_eq!(code["execution_count"], json!(3));
}

#[test]
fn test_cell_ids_follow_format_version() {
    let (notebook, _) = load();
    for cell in notebook.to_json().to_value()["cells"].as_array().unwrap() {
        assert!(cell.get("id").is_some());
    }

    notebook.set_nbformat_minor(4).unwrap();
    for cell in notebook.to_json().to_value()["cells"].as_array().unwrap() {
        assert!(cell.get("id").is_none());
    }
}

#[test]
fn test_inserted_cell_reads_back_with_defaults() {
    let (notebook, _) = load();
    let cell = notebook.insert_cell(1, CellContent::code("x = 1")).unwrap();

    let fetched = notebook.get_cell(1).unwrap();
    assert_eq!(fetched, cell);
    assert_eq!(
        fetched.to_json(),
        json!({
            "id": cell.id(),
            "cell_type": "code",
            "source": "x = 1",
            "metadata": {},
            "outputs": [],
            "execution_count": null
        })
    );
}

#[test]
fn test_source_edits() {
    let cell = YCell::standalone(CellContent::code("fooo bar")).unwrap();
    cell.update_source(3, 5, "/").unwrap();
    assert_eq!(cell.source(), "foo/bar");

    for value in ["a", "ab", "", "final value"] {
        cell.set_source(value).unwrap();
    }
    assert_eq!(cell.source(), "final value");
}

#[test]
fn test_collapsed_is_mirrored_both_ways() {
    let cell = YCell::standalone(CellContent::code("")).unwrap();
    cell.set_metadata("collapsed", json!(true)).unwrap();
    assert_eq!(
        cell.metadata().map(Value::Object),
        Some(json!({"collapsed": true, "jupyter": {"outputs_hidden": true}}))
    );

    let cell = YCell::standalone(CellContent::code("")).unwrap();
    cell.set_metadata("jupyter", json!({"outputs_hidden": true}))
        .unwrap();
    assert_eq!(
        cell.metadata().map(Value::Object),
        Some(json!({"collapsed": true, "jupyter": {"outputs_hidden": true}}))
    );
}

#[test]
fn test_state_changes_only_on_new_values() {
    let file = YFile::new();
    let changes = Rc::new(RefCell::new(Vec::new()));
    let sink = changes.clone();
    file.changed()
        .connect(move |c: &FileChange| sink.borrow_mut().push(c.clone()));

    file.set_state("dirty", json!(false)).unwrap();
    file.set_state("dirty", json!(false)).unwrap();
    file.set_state("dirty", json!(true)).unwrap();

    let changes = changes.borrow();
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(|c| c.state_change.is_some()));
}

#[test]
fn test_delete_and_move() {
    let notebook = YNotebook::new();
    let only = notebook.add_cell(CellContent::markdown("only")).unwrap();
    notebook.delete_cell(0).unwrap();
    assert_eq!(notebook.cell_count(), 0);
    assert!(only.is_disposed());

    let first = notebook.add_cell(CellContent::code("first")).unwrap();
    notebook.add_cell(CellContent::code("second")).unwrap();
    let before = first.to_json();
    notebook.move_cell(0, 1).unwrap();

    let moved = notebook.get_cell(1).unwrap();
    assert_eq!(moved.to_json(), before);
    assert_ne!(moved, first);
}
