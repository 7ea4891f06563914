//! Selection and viewport behaviour across bulk table updates.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use trellis::prelude::*;

fn letters(items: &[&'static str]) -> Arc<Table<&'static str>> {
    Arc::new(
        Table::new()
            .with_column(TableColumn::new("name", ValueType::Text, |s: &&'static str| {
                (*s).into()
            }))
            .with_items(items.to_vec()),
    )
}

fn count_events<A: Clone + Send + 'static>(signal: &Signal<A>) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    signal.connect(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    count
}

#[test]
fn test_removed_item_leaves_selection_empty() {
    let table = letters(&["A", "B", "C"]);
    let view = TableView::with_table(table.clone(), BindingConfig::default());
    view.set_selection(Selection::single("B"));
    let events = count_events(&view.selection_changed);

    table.items().transaction(|items| {
        items.remove(&"B");
        items.sort_by(|a, b| b.cmp(a));
    });

    assert_eq!(table.items().to_vec(), vec!["C", "A"]);
    assert!(view.selection().is_empty());
    assert_eq!(events.load(Ordering::SeqCst), 1);
}

#[test]
fn test_reorder_keeps_selection() {
    let table = letters(&["A", "B", "C"]);
    let view = TableView::with_table(table.clone(), BindingConfig::default());
    view.set_selection(Selection::single("A"));
    let events = count_events(&view.selection_changed);

    table.items().set_all(vec!["C", "A", "B"]);

    assert_eq!(view.selection(), Selection::single("A"));
    assert_eq!(view.selected_rows(), vec![1]);
    assert_eq!(events.load(Ordering::SeqCst), 0);
}

#[test]
fn test_notification_count_inside_transaction_does_not_matter() {
    let table = letters(&["A", "B", "C", "D"]);
    let view = TableView::with_table(table.clone(), BindingConfig::default());
    view.select_rows(&[0, 3]);
    let events = count_events(&view.selection_changed);

    // No notifications at all.
    table.items().transaction(|_| {});
    // Many.
    table.items().transaction(|items| {
        for letter in ["E", "F", "G"] {
            items.add(letter);
        }
        items.remove(&"D");
        items.insert(0, "Z").unwrap();
    });

    assert_eq!(view.selection(), Selection::single("A"));
    assert_eq!(view.selected_rows(), vec![1]);
    assert_eq!(events.load(Ordering::SeqCst), 1);
}

#[test]
fn test_scroll_position_survives_sort() {
    let names: Vec<&'static str> = (0..40)
        .map(|i| Box::leak(format!("row {i:02}").into_boxed_str()) as &'static str)
        .collect();
    let table = letters(&names);
    let view = TableView::with_table(table.clone(), BindingConfig::default());
    view.set_viewport_capacity(10);
    view.scroll_to(12);

    table.sort(SortParams::new("name", false)).unwrap();
    assert_eq!(view.viewport().first_visible(), 12);

    // Out of range after shrinking: the viewport clamps, nothing fails.
    table.items().retain(|name| name.ends_with('0'));
    assert_eq!(view.viewport().item_count(), 4);
    assert_eq!(view.viewport().first_visible(), 0);
}

#[test]
fn test_off_screen_selection_is_scrolled_into_view_after_transaction() {
    let names: Vec<&'static str> = (0..30)
        .map(|i| Box::leak(format!("row {i:02}").into_boxed_str()) as &'static str)
        .collect();
    let table = letters(&names);
    let view = TableView::with_table(table.clone(), BindingConfig::default());
    view.set_viewport_capacity(5);
    view.select_rows(&[2]);
    assert_eq!(view.viewport().first_visible(), 0);

    // The selected row moves to 27, far below the viewport.
    table.sort(SortParams::new("name", false)).unwrap();
    assert_eq!(view.selected_rows(), vec![27]);
    assert!(view.viewport().is_displayed(27));
}

#[test]
fn test_restore_can_be_disabled() {
    let table = letters(&["A", "B", "C"]);
    let config = BindingConfig::from_toml_str("restore_on_transaction = false").unwrap();
    let view = TableView::with_table(table.clone(), config);
    view.set_viewport_capacity(2);
    view.select_rows(&[2]);
    assert_eq!(view.viewport().first_visible(), 1);

    view.force_selection_display.set(false);
    table.items().set_all(vec!["C", "B", "A"]);
    // Selection still follows items; the viewport is left alone.
    assert_eq!(view.selected_rows(), vec![0]);
    assert_eq!(view.viewport().first_visible(), 1);
}

#[test]
fn test_forced_display_without_restore() {
    let table = letters(&["A", "B", "C"]);
    let config = BindingConfig::from_toml_str("restore_on_transaction = false").unwrap();
    let view = TableView::with_table(table.clone(), config);
    view.set_viewport_capacity(2);
    view.select_rows(&[2]);
    assert_eq!(view.viewport().first_visible(), 1);

    table.items().set_all(vec!["C", "B", "A"]);
    // C moved above the viewport and is scrolled back into view.
    assert_eq!(view.selected_rows(), vec![0]);
    assert_eq!(view.viewport().first_visible(), 0);
}

#[test]
fn test_background_transaction_is_marshaled() {
    let dispatcher = Dispatcher::install();
    let table = letters(&["A", "B", "C"]);
    let view = TableView::with_table(table.clone(), BindingConfig::default());
    view.set_selection(Selection::single("C"));
    let events = count_events(&view.selection_changed);

    let background = table.clone();
    std::thread::spawn(move || {
        background.items().transaction(|items| {
            items.remove(&"A");
            items.add("D");
        });
    })
    .join()
    .unwrap();

    // Nothing reached the view yet.
    assert_eq!(view.projection().item_count(), 3);
    assert!(dispatcher.process_pending() > 0);
    assert_eq!(view.projection().item_count(), 3);
    assert_eq!(view.selected_rows(), vec![1]);
    assert_eq!(events.load(Ordering::SeqCst), 0);
}
