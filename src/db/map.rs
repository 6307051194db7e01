//! Map store.
//!
//! Maps load once per game, either from a sqlite map database (schema:
//! `map`, `line`, `point`, `post`) or from the built-in fixture maps when
//! no `MAP_DB_URL` is configured. Fixtures double as the test maps.

use sqlx::SqlitePool;

use crate::db;
use crate::errors::ServerError;
use crate::models::map::Map;
use crate::models::point::{Coordinate, Line, Point};
use crate::models::post::{Post, PostType, Town};

/// Source of maps for new games: a sqlite store when configured, the
/// built-in fixtures otherwise.
#[derive(Debug, Clone)]
pub struct MapStore {
    pool: Option<SqlitePool>,
}

impl MapStore {
    pub async fn connect(url: Option<&str>) -> Result<Self, ServerError> {
        let pool = match url {
            Some(url) => Some(db::connect(Some(url)).await?),
            None => None,
        };
        Ok(Self { pool })
    }

    pub fn fixtures_only() -> Self {
        Self { pool: None }
    }

    pub async fn load(&self, name: &str) -> Result<Map, ServerError> {
        match &self.pool {
            Some(pool) => MapRepository::new(pool.clone()).load(name).await,
            None => fixtures::by_name(name)
                .ok_or_else(|| ServerError::ResourceNotFound(format!("no such map: {name}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MapRepository {
    pool: SqlitePool,
}

impl MapRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Loads one map with its lines, points and posts.
    pub async fn load(&self, name: &str) -> Result<Map, ServerError> {
        let (map_id, size_x, size_y) = sqlx::query_as::<_, (i64, i64, i64)>(
            "SELECT id, size_x, size_y FROM map WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServerError::ResourceNotFound(format!("no such map: {name}")))?;

        let mut map = Map {
            idx: map_id as u32,
            name: name.to_string(),
            size: (size_x as u32, size_y as u32),
            ..Map::default()
        };

        let lines = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            "SELECT id, len, p0, p1 FROM line WHERE map_id = $1 ORDER BY id",
        )
        .bind(map_id)
        .fetch_all(&self.pool)
        .await?;
        for (id, len, p0, p1) in lines {
            map.lines
                .insert(id as u32, Line::new(id as u32, len as u32, p0 as u32, p1 as u32));
        }

        let points = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            "SELECT id, post_id, x, y FROM point WHERE map_id = $1 ORDER BY id",
        )
        .bind(map_id)
        .fetch_all(&self.pool)
        .await?;
        for (id, post_id, x, y) in points {
            let idx = id as u32;
            map.points.insert(
                idx,
                Point {
                    idx,
                    post_id: (post_id > 0).then_some(post_id as u32),
                },
            );
            map.coordinates.insert(
                idx,
                Coordinate {
                    idx,
                    x: x as i32,
                    y: y as i32,
                },
            );
        }

        let posts = sqlx::query_as::<_, (i64, String, i64, i64, i64, i64, i64)>(
            "SELECT id, name, type, population, armor, product, replenishment
             FROM post WHERE map_id = $1 ORDER BY id",
        )
        .bind(map_id)
        .fetch_all(&self.pool)
        .await?;
        for (id, post_name, kind, population, armor, product, replenishment) in posts {
            let idx = id as u32;
            let point_id = map
                .points
                .values()
                .find(|p| p.post_id == Some(idx))
                .map(|p| p.idx)
                .ok_or_else(|| {
                    ServerError::Database(format!("post {idx} is not placed on any point"))
                })?;
            let kind = PostType::from_code(kind as u32)
                .ok_or_else(|| ServerError::Database(format!("post {idx} has unknown type")))?;
            let post = match kind {
                PostType::Town => Post::town(
                    idx,
                    &post_name,
                    point_id,
                    Town::new(1, population as u32, product as u32, armor as u32),
                ),
                PostType::Market => {
                    Post::market(idx, &post_name, point_id, product as u32, replenishment as u32)
                }
                PostType::Storage => {
                    Post::storage(idx, &post_name, point_id, armor as u32, replenishment as u32)
                }
            };
            map.posts.insert(idx, post);
        }

        Ok(map)
    }
}

/// Built-in maps, mirroring the generated fixture databases.
pub mod fixtures {
    use super::*;

    pub fn by_name(name: &str) -> Option<Map> {
        match name {
            "map02" => Some(map02()),
            "map03" => Some(map03()),
            _ => None,
        }
    }

    /// A ring of twelve points around one town, three markets of
    /// different sizes on the way.
    pub fn map02() -> Map {
        let mut map = Map {
            idx: 2,
            name: "map02".to_string(),
            size: (330, 248),
            ..Map::default()
        };

        let coords = [
            (1, 75, 16),
            (2, 250, 16),
            (3, 312, 120),
            (4, 250, 220),
            (5, 100, 220),
            (6, 10, 120),
            (7, 134, 70),
            (8, 200, 70),
            (9, 235, 120),
            (10, 198, 160),
            (11, 134, 160),
            (12, 85, 120),
        ];
        let posts_at = [(1u32, 1u32), (4, 2), (5, 3), (7, 4)];
        for (idx, x, y) in coords {
            let post_id = posts_at.iter().find(|(p, _)| *p == idx).map(|(_, id)| *id);
            map.points.insert(idx, Point { idx, post_id });
            map.coordinates.insert(idx, Coordinate { idx, x, y });
        }

        map.posts
            .insert(1, Post::town(1, "town-one", 1, Town::new(1, 3, 35, 0)));
        map.posts.insert(2, Post::market(2, "market-big", 4, 36, 1));
        map.posts
            .insert(3, Post::market(3, "market-medium", 5, 28, 1));
        map.posts.insert(4, Post::market(4, "market-small", 7, 5, 1));

        let lines = [
            (1, 1, 1, 7),
            (2, 1, 8, 2),
            (3, 1, 9, 3),
            (4, 1, 10, 4),
            (5, 1, 11, 5),
            (6, 2, 12, 6),
            (7, 1, 7, 8),
            (8, 2, 8, 9),
            (9, 2, 9, 10),
            (10, 1, 10, 11),
            (11, 3, 11, 12),
            (12, 1, 12, 7),
            (13, 2, 1, 2),
            (14, 2, 2, 3),
            (15, 1, 3, 4),
            (16, 3, 4, 5),
            (17, 1, 5, 6),
            (18, 3, 6, 1),
        ];
        for (idx, len, p0, p1) in lines {
            map.lines.insert(idx, Line::new(idx, len, p0, p1));
        }

        map
    }

    /// Two towns facing each other over a market and a storage; the small
    /// southern detour connects them with unit-length lines.
    pub fn map03() -> Map {
        let mut map = Map {
            idx: 3,
            name: "map03".to_string(),
            size: (300, 300),
            ..Map::default()
        };

        let coords = [
            (1, 20, 150),
            (2, 280, 150),
            (3, 150, 60),
            (4, 150, 240),
            (5, 100, 280),
            (6, 200, 280),
        ];
        let posts_at = [(1u32, 1u32), (2, 2), (3, 3), (4, 4)];
        for (idx, x, y) in coords {
            let post_id = posts_at.iter().find(|(p, _)| *p == idx).map(|(_, id)| *id);
            map.points.insert(idx, Point { idx, post_id });
            map.coordinates.insert(idx, Coordinate { idx, x, y });
        }

        map.posts
            .insert(1, Post::town(1, "town-alpha", 1, Town::new(1, 4, 40, 80)));
        map.posts
            .insert(2, Post::town(2, "town-beta", 2, Town::new(1, 4, 40, 80)));
        map.posts
            .insert(3, Post::market(3, "market-central", 3, 30, 2));
        map.posts
            .insert(4, Post::storage(4, "storage-central", 4, 30, 2));

        let lines = [
            (1, 2, 1, 3),
            (2, 2, 3, 2),
            (3, 3, 1, 4),
            (4, 3, 4, 2),
            (5, 1, 1, 5),
            (6, 1, 5, 6),
            (7, 1, 6, 2),
        ];
        for (idx, len, p0, p1) in lines {
            map.lines.insert(idx, Line::new(idx, len, p0, p1));
        }

        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_lookup() {
        assert!(fixtures::by_name("map02").is_some());
        assert!(fixtures::by_name("map03").is_some());
        assert!(fixtures::by_name("map99").is_none());
    }

    #[test]
    fn test_map02_shape() {
        let map = fixtures::map02();
        assert_eq!(map.points.len(), 12);
        assert_eq!(map.lines.len(), 18);
        assert_eq!(map.towns(), vec![1]);
        // Line 1 connects the town to the small market.
        let line = &map.lines[&1];
        assert_eq!(line.length, 1);
        assert_eq!(map.post_at_point(line.points[1]).unwrap().name, "market-small");
    }

    #[test]
    fn test_map03_has_two_towns() {
        let map = fixtures::map03();
        assert_eq!(map.towns().len(), 2);
        // Every line endpoint exists.
        for line in map.lines.values() {
            assert!(map.points.contains_key(&line.points[0]));
            assert!(map.points.contains_key(&line.points[1]));
        }
    }

    #[tokio::test]
    async fn test_store_falls_back_to_fixtures() {
        let store = MapStore::fixtures_only();
        let map = store.load("map02").await.unwrap();
        assert_eq!(map.name, "map02");
        assert!(store.load("nothing").await.is_err());
    }

    #[tokio::test]
    async fn test_repository_loads_generated_map() {
        let pool = db::connect(None).await.unwrap();
        for sql in [
            "CREATE TABLE map (id INTEGER PRIMARY KEY, name TEXT, size_x INTEGER, size_y INTEGER)",
            "CREATE TABLE line (id INTEGER PRIMARY KEY, len INTEGER, p0 INTEGER, p1 INTEGER, map_id INTEGER)",
            "CREATE TABLE point (id INTEGER PRIMARY KEY, map_id INTEGER, post_id INTEGER, x INTEGER, y INTEGER)",
            "CREATE TABLE post (id INTEGER PRIMARY KEY, name TEXT, type INTEGER, population INTEGER,
                                armor INTEGER, product INTEGER, replenishment INTEGER, map_id INTEGER)",
            "INSERT INTO map VALUES (1, 'mini', 100, 100)",
            "INSERT INTO post VALUES (1, 'town', 1, 3, 0, 35, 1, 1)",
            "INSERT INTO post VALUES (2, 'market', 2, 0, 0, 9, 1, 1)",
            "INSERT INTO point VALUES (1, 1, 1, 10, 10)",
            "INSERT INTO point VALUES (2, 1, 2, 90, 90)",
            "INSERT INTO line VALUES (1, 4, 1, 2, 1)",
        ] {
            sqlx::query(sql).execute(&pool).await.unwrap();
        }

        let map = MapRepository::new(pool).load("mini").await.unwrap();
        assert_eq!(map.size, (100, 100));
        assert_eq!(map.lines[&1].length, 4);
        assert_eq!(map.posts[&1].post_type(), PostType::Town);
        assert_eq!(map.posts[&2].point_id, 2);
    }
}
