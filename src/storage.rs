//! Local storage using SQLite - offline favorites and wishlist data

use crate::error::Result;
use crate::models::{FavoriteProduct, WishlistCollection, WishlistItem};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

pub struct LocalStorage {
    conn: Mutex<Connection>,
}

impl LocalStorage {
    pub fn new(data_dir: &str) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = Path::new(data_dir).join("marketchat.db");
        let conn = Connection::open(db_path)?;

        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;

        Ok(storage)
    }

    #[cfg(test)]
    fn open_in_memory() -> Result<Self> {
        let storage = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS favorites (
                product_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                price REAL NOT NULL,
                image_url TEXT,
                added_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS wishlist_collections (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS wishlist_items (
                collection_id TEXT NOT NULL,
                product_id TEXT NOT NULL,
                title TEXT NOT NULL,
                price REAL NOT NULL,
                image_url TEXT,
                added_at INTEGER NOT NULL,
                PRIMARY KEY (collection_id, product_id),
                FOREIGN KEY (collection_id) REFERENCES wishlist_collections(id)
            );

            CREATE INDEX IF NOT EXISTS idx_wishlist_items_collection ON wishlist_items(collection_id);
            "#,
        )?;

        Ok(())
    }

    // ========================================================================
    // Favorites
    // ========================================================================

    pub fn add_favorite(&self, product: &FavoriteProduct) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT OR REPLACE INTO favorites (product_id, title, price, image_url, added_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                product.product_id,
                product.title,
                product.price,
                product.image_url,
                product.added_at,
            ],
        )?;
        Ok(())
    }

    pub fn remove_favorite(&self, product_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM favorites WHERE product_id = ?1", params![product_id])?;
        Ok(())
    }

    pub fn is_favorite(&self, product_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM favorites WHERE product_id = ?1",
            params![product_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_favorites(&self) -> Result<Vec<FavoriteProduct>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"SELECT product_id, title, price, image_url, added_at
               FROM favorites
               ORDER BY added_at DESC"#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(FavoriteProduct {
                product_id: row.get(0)?,
                title: row.get(1)?,
                price: row.get(2)?,
                image_url: row.get(3)?,
                added_at: row.get(4)?,
            })
        })?;

        let mut favorites = Vec::new();
        for row in rows {
            favorites.push(row?);
        }

        Ok(favorites)
    }

    // ========================================================================
    // Wishlist collections
    // ========================================================================

    pub fn create_collection(&self, name: &str) -> Result<WishlistCollection> {
        let collection = WishlistCollection {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO wishlist_collections (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![collection.id, collection.name, collection.created_at],
        )?;

        Ok(collection)
    }

    pub fn get_collections(&self) -> Result<Vec<WishlistCollection>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, created_at FROM wishlist_collections ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(WishlistCollection {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;

        let mut collections = Vec::new();
        for row in rows {
            collections.push(row?);
        }

        Ok(collections)
    }

    pub fn delete_collection(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM wishlist_items WHERE collection_id = ?1", params![id])?;
        conn.execute("DELETE FROM wishlist_collections WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ========================================================================
    // Wishlist items
    // ========================================================================

    pub fn add_wishlist_item(&self, item: &WishlistItem) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT OR REPLACE INTO wishlist_items
               (collection_id, product_id, title, price, image_url, added_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                item.collection_id,
                item.product_id,
                item.title,
                item.price,
                item.image_url,
                item.added_at,
            ],
        )?;
        Ok(())
    }

    pub fn remove_wishlist_item(&self, collection_id: &str, product_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM wishlist_items WHERE collection_id = ?1 AND product_id = ?2",
            params![collection_id, product_id],
        )?;
        Ok(())
    }

    pub fn get_wishlist_items(&self, collection_id: &str) -> Result<Vec<WishlistItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"SELECT collection_id, product_id, title, price, image_url, added_at
               FROM wishlist_items
               WHERE collection_id = ?1
               ORDER BY added_at DESC"#,
        )?;

        let rows = stmt.query_map(params![collection_id], |row| {
            Ok(WishlistItem {
                collection_id: row.get(0)?,
                product_id: row.get(1)?,
                title: row.get(2)?,
                price: row.get(3)?,
                image_url: row.get(4)?,
                added_at: row.get(5)?,
            })
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn favorite(id: &str) -> FavoriteProduct {
        FavoriteProduct {
            product_id: id.to_string(),
            title: format!("Product {}", id),
            price: 19.99,
            image_url: None,
            added_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_favorites_round_trip() {
        let storage = LocalStorage::open_in_memory().unwrap();

        assert!(!storage.is_favorite("p1").unwrap());
        storage.add_favorite(&favorite("p1")).unwrap();
        assert!(storage.is_favorite("p1").unwrap());

        let all = storage.get_favorites().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].product_id, "p1");
        assert_eq!(all[0].price, 19.99);

        storage.remove_favorite("p1").unwrap();
        assert!(!storage.is_favorite("p1").unwrap());
        assert!(storage.get_favorites().unwrap().is_empty());
    }

    #[test]
    fn test_add_favorite_twice_is_replace() {
        let storage = LocalStorage::open_in_memory().unwrap();

        storage.add_favorite(&favorite("p1")).unwrap();
        let mut updated = favorite("p1");
        updated.price = 9.99;
        storage.add_favorite(&updated).unwrap();

        let all = storage.get_favorites().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].price, 9.99);
    }

    #[test]
    fn test_wishlist_crud() {
        let storage = LocalStorage::open_in_memory().unwrap();

        let collection = storage.create_collection("gifts").unwrap();
        assert_eq!(storage.get_collections().unwrap().len(), 1);

        let item = WishlistItem {
            collection_id: collection.id.clone(),
            product_id: "p7".to_string(),
            title: "Lamp".to_string(),
            price: 45.0,
            image_url: Some("https://cdn.example/lamp.jpg".to_string()),
            added_at: 1_700_000_000_000,
        };
        storage.add_wishlist_item(&item).unwrap();

        let items = storage.get_wishlist_items(&collection.id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, "p7");

        storage.remove_wishlist_item(&collection.id, "p7").unwrap();
        assert!(storage.get_wishlist_items(&collection.id).unwrap().is_empty());

        storage.delete_collection(&collection.id).unwrap();
        assert!(storage.get_collections().unwrap().is_empty());
    }

    #[test]
    fn test_delete_collection_removes_items() {
        let storage = LocalStorage::open_in_memory().unwrap();

        let collection = storage.create_collection("tech").unwrap();
        storage
            .add_wishlist_item(&WishlistItem {
                collection_id: collection.id.clone(),
                product_id: "p1".to_string(),
                title: "Keyboard".to_string(),
                price: 80.0,
                image_url: None,
                added_at: 1,
            })
            .unwrap();

        storage.delete_collection(&collection.id).unwrap();
        assert!(storage.get_wishlist_items(&collection.id).unwrap().is_empty());
    }
}
