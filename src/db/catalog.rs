/// Read-only product and category listings for a tenant
use crate::error::ApiResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub store_id: i64,
    pub category_id: Option<i64>,
    pub name: String,
    pub price: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub store_id: i64,
    pub name: String,
}

/// One cursor page of products, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub has_more: bool,
    pub next_cursor: Option<i64>,
}

/// Fetch products with ids below `cursor` (all products when `None`)
pub async fn products_page(
    conn: &mut SqliteConnection,
    store_id: i64,
    limit: u32,
    cursor: Option<i64>,
) -> ApiResult<ProductPage> {
    let limit = limit.max(1) as i64;

    // One extra row tells us whether another page exists
    let mut items = sqlx::query_as::<_, Product>(
        "SELECT id, store_id, category_id, name, price, image_url, created_at FROM product
         WHERE store_id = ?1 AND (?2 IS NULL OR id < ?2)
         ORDER BY id DESC
         LIMIT ?3",
    )
    .bind(store_id)
    .bind(cursor)
    .bind(limit + 1)
    .fetch_all(&mut *conn)
    .await?;

    let has_more = items.len() as i64 > limit;
    items.truncate(limit as usize);
    let next_cursor = if has_more { items.last().map(|p| p.id) } else { None };

    Ok(ProductPage {
        items,
        has_more,
        next_cursor,
    })
}

pub async fn categories(conn: &mut SqliteConnection, store_id: i64) -> ApiResult<Vec<Category>> {
    let categories = sqlx::query_as::<_, Category>(
        "SELECT id, store_id, name FROM category WHERE store_id = ?1 ORDER BY name",
    )
    .bind(store_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(categories)
}
