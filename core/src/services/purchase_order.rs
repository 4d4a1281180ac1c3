// ============================================================================
// Module: core/src/purchase_order.rs
// Description: Draft basket and finalize/PDF workflow (C11)
// ============================================================================

use genpdf::elements::{Break, Paragraph, TableLayout};
use genpdf::{fonts, Document, Element, SimplePageDecorator};
use invoice_shared::error::{Error, Result};
use invoice_shared::models::purchase_order::{DraftPOLine, PurchaseOrder, PurchaseOrderItem};
use invoice_shared::models::stock::StockLevel;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// Default reorder quantity when adding a part to the draft basket, spec
/// §4.11: `max(1, reorder_point)`.
pub fn default_reorder_quantity(reorder_point: Option<i64>) -> i64 {
    reorder_point.unwrap_or(0).max(1)
}

/// Builds the `PurchaseOrderItem` snapshot for one draft line against its
/// current stock level, spec §4.11/§4.10 ("`[Backorder: N]`" annotation).
pub fn snapshot_line(draft: &DraftPOLine, stock: &StockLevel) -> PurchaseOrderItem {
    let on_hand = stock.on_hand();
    let (clamped_stock, notes_suffix) = if on_hand < 0 {
        (0, Some(format!("[Backorder: {}]", -on_hand)))
    } else {
        (on_hand, None)
    };

    let description = match (stock.internal_item_name.clone(), notes_suffix) {
        (Some(name), Some(suffix)) => Some(format!("{name} {suffix}")),
        (Some(name), None) => Some(name),
        (None, Some(suffix)) => Some(suffix),
        (None, None) => None,
    };

    let line_total = Decimal::from(draft.quantity) * draft.unit_value;

    PurchaseOrderItem {
        part_number: draft.part_number.clone(),
        description,
        stock: clamped_stock,
        reorder_point: stock.reorder_point,
        quantity: draft.quantity,
        unit_value: draft.unit_value,
        line_total,
    }
}

pub struct PurchaseOrderWorkflow {
    pool: PgPool,
}

impl PurchaseOrderWorkflow {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Add or update a draft basket line, spec §4.11: `on_conflict=(tenant,
    /// part_number)`; requires an existing `StockLevel` row.
    pub async fn add_draft_line(&self, tenant: &str, part_number: &str, quantity: i64) -> Result<DraftPOLine> {
        if quantity <= 0 {
            return Err(Error::BadRequest("quantity must be > 0".to_string()));
        }

        let stock: Option<StockLevel> =
            sqlx::query_as("SELECT * FROM stock_levels WHERE tenant = $1 AND part_number = $2")
                .bind(tenant)
                .bind(part_number)
                .fetch_optional(&self.pool)
                .await?;
        let stock = stock.ok_or_else(|| {
            Error::NotFound(format!("no stock level for part_number {part_number}"))
        })?;

        let unit_value = stock.unit_value.unwrap_or(Decimal::ZERO);

        let line: DraftPOLine = sqlx::query_as(
            r#"
            INSERT INTO draft_po_lines (tenant, part_number, quantity, unit_value, priority, notes)
            VALUES ($1, $2, $3, $4, $5, NULL)
            ON CONFLICT (tenant, part_number) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                unit_value = EXCLUDED.unit_value
            RETURNING *
            "#,
        )
        .bind(tenant)
        .bind(part_number)
        .bind(quantity)
        .bind(unit_value)
        .bind(stock.priority)
        .fetch_one(&self.pool)
        .await?;

        Ok(line)
    }

    pub async fn draft_items(&self, tenant: &str) -> Result<Vec<DraftPOLine>> {
        let lines: Vec<DraftPOLine> =
            sqlx::query_as("SELECT * FROM draft_po_lines WHERE tenant = $1 ORDER BY part_number")
                .bind(tenant)
                .fetch_all(&self.pool)
                .await?;
        Ok(lines)
    }

    /// Finalize the draft basket: snapshot lines, generate `po_number`,
    /// render a PDF, clear the basket. Returns the stored order and PDF
    /// bytes, spec §4.11.
    pub async fn finalize(
        &self,
        tenant: &str,
        supplier_name: Option<String>,
        notes: Option<String>,
    ) -> Result<(PurchaseOrder, Vec<u8>)> {
        let drafts = self.draft_items(tenant).await?;
        if drafts.is_empty() {
            return Err(Error::BadRequest("draft basket is empty".to_string()));
        }

        let mut items = Vec::with_capacity(drafts.len());
        for draft in &drafts {
            let stock: Option<StockLevel> =
                sqlx::query_as("SELECT * FROM stock_levels WHERE tenant = $1 AND part_number = $2")
                    .bind(tenant)
                    .bind(&draft.part_number)
                    .fetch_optional(&self.pool)
                    .await?;
            let stock = stock.ok_or_else(|| {
                Error::NotFound(format!("no stock level for part_number {}", draft.part_number))
            })?;
            items.push(snapshot_line(draft, &stock));
        }

        let total_cost: Decimal = items.iter().map(|i| i.line_total).sum();

        let today = chrono::Utc::now().date_naive();
        let family = PurchaseOrder::number_family(tenant, today);
        let existing_numbers: Vec<String> =
            sqlx::query_scalar("SELECT po_number FROM purchase_orders WHERE tenant = $1 AND po_number LIKE $2")
                .bind(tenant)
                .bind(format!("{family}%"))
                .fetch_all(&self.pool)
                .await?;
        let sequence = PurchaseOrder::next_sequence(&family, &existing_numbers);
        let po_number = format!("{family}{sequence:03}");

        let pdf_bytes = render_pdf(&po_number, tenant, supplier_name.as_deref(), notes.as_deref(), &items, total_cost)?;
        let pdf_file_path = format!("{tenant}/purchase-orders/{po_number}.pdf");

        let id = Uuid::new_v4();
        let order: PurchaseOrder = sqlx::query_as(
            r#"
            INSERT INTO purchase_orders
                (id, tenant, po_number, line_items, supplier_name, notes, total_cost, pdf_file_path)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(tenant)
        .bind(&po_number)
        .bind(sqlx::types::Json(items))
        .bind(&supplier_name)
        .bind(&notes)
        .bind(total_cost)
        .bind(&pdf_file_path)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query("DELETE FROM draft_po_lines WHERE tenant = $1")
            .bind(tenant)
            .execute(&self.pool)
            .await?;

        info!(tenant, po_number, "purchase order finalized");
        Ok((order, pdf_bytes))
    }
}

/// Renders the purchase-order PDF: header, item table (# / part /
/// description / stock / reorder / qty / unit / line-total / TOTAL), terms,
/// and signature blocks, spec §4.11.
fn render_pdf(
    po_number: &str,
    tenant: &str,
    supplier_name: Option<&str>,
    notes: Option<&str>,
    items: &[PurchaseOrderItem],
    total_cost: Decimal,
) -> Result<Vec<u8>> {
    let font_family = fonts::from_files("/usr/share/fonts/truetype/liberation", "LiberationSans", None)
        .map_err(|e| Error::Internal(format!("loading PDF font family: {e}")))?;

    let mut doc = Document::new(font_family);
    doc.set_title(format!("Purchase Order {po_number}"));
    let mut decorator = SimplePageDecorator::new();
    decorator.set_margins(10);
    doc.set_page_decorator(decorator);

    doc.push(Paragraph::new(format!("Purchase Order {po_number}")));
    doc.push(Paragraph::new(format!("Tenant: {tenant}")));
    if let Some(supplier) = supplier_name {
        doc.push(Paragraph::new(format!("Supplier: {supplier}")));
    }
    doc.push(Break::new(1));

    let mut table = TableLayout::new(vec![1, 3, 2, 1, 1, 1, 2, 2]);
    table
        .row()
        .element(Paragraph::new("#"))
        .element(Paragraph::new("Part"))
        .element(Paragraph::new("Description"))
        .element(Paragraph::new("Stock"))
        .element(Paragraph::new("Reorder"))
        .element(Paragraph::new("Qty"))
        .element(Paragraph::new("Unit"))
        .element(Paragraph::new("Line Total"))
        .push()
        .map_err(|e| Error::Internal(format!("rendering PDF table header: {e}")))?;

    for (idx, item) in items.iter().enumerate() {
        table
            .row()
            .element(Paragraph::new((idx + 1).to_string()))
            .element(Paragraph::new(item.part_number.clone()))
            .element(Paragraph::new(item.description.clone().unwrap_or_default()))
            .element(Paragraph::new(item.stock.to_string()))
            .element(Paragraph::new(
                item.reorder_point.map(|n| n.to_string()).unwrap_or_default(),
            ))
            .element(Paragraph::new(item.quantity.to_string()))
            .element(Paragraph::new(item.unit_value.to_string()))
            .element(Paragraph::new(item.line_total.to_string()))
            .push()
            .map_err(|e| Error::Internal(format!("rendering PDF table row: {e}")))?;
    }

    doc.push(table);
    doc.push(Break::new(1));
    doc.push(Paragraph::new(format!("TOTAL: {total_cost}")));

    if let Some(notes) = notes {
        doc.push(Break::new(1));
        doc.push(Paragraph::new(format!("Terms: {notes}")));
    }

    doc.push(Break::new(2));
    doc.push(Paragraph::new("Authorized Signature: ____________________"));

    let mut buffer = Vec::new();
    doc.render(&mut buffer)
        .map_err(|e| Error::Internal(format!("rendering PDF: {e}")))?;
    Ok(buffer)
}
