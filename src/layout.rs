use crate::models::{BoardDocument, Geometry, GridItem, GridSettings, LayoutItem};

/// Resolves a grid key to a widget position.
///
/// Keys are stable widget ids. Index-encoded keys (`<prefix>_<index>_<name>`)
/// are still accepted; they are only as reliable as the widget order at the
/// moment the grid reported them.
pub fn resolve_widget_index(document: &BoardDocument, key: &str) -> Option<usize> {
    document
        .widget_index(key)
        .or_else(|| legacy_index(key).filter(|index| *index < document.widgets.len()))
}

pub fn legacy_index(key: &str) -> Option<usize> {
    key.split('_').nth(1)?.parse().ok()
}

pub fn reconcile(layout: &[LayoutItem], document: &BoardDocument) -> BoardDocument {
    reconcile_with(layout, document, &GridSettings::default())
}

/// Returns a copy of `document` with the reported geometry written into each
/// addressed widget. Only `x`, `y`, `w` and `h` change.
pub fn reconcile_with(layout: &[LayoutItem], document: &BoardDocument, grid: &GridSettings) -> BoardDocument {
    let mut next = document.clone();
    for item in layout {
        let Some(index) = resolve_widget_index(&next, &item.i) else {
            tracing::warn!(key = %item.i, "layout item does not address a widget");
            continue;
        };
        next.widgets[index].set_geometry(reported_geometry(item, grid));
    }
    next
}

fn reported_geometry(item: &LayoutItem, grid: &GridSettings) -> Geometry {
    Geometry {
        x: item.x.unwrap_or(0),
        y: item.y.unwrap_or(0),
        w: item.w.filter(|w| *w != 0).unwrap_or(grid.reconcile_default_w),
        h: item.h.filter(|h| *h != 0).unwrap_or(grid.reconcile_default_h),
    }
}

/// Projects the board's widgets onto the grid, keyed by widget id.
pub fn grid_layout(document: &BoardDocument, grid: &GridSettings) -> Vec<GridItem> {
    document
        .widgets
        .iter()
        .map(|widget| GridItem {
            i: widget.id.clone(),
            x: widget.x,
            y: widget.y,
            w: if widget.w != 0 { widget.w } else { grid.render_default_w },
            h: if widget.h != 0 { widget.h } else { grid.render_default_h },
            widget_type: widget.widget_type.clone(),
        })
        .collect()
}

pub fn style_rules(document: &BoardDocument) -> Vec<String> {
    document.styles.iter().map(|style| style.css_rule()).collect()
}
