//!
//! Maps the cluster and its databases onto telemetry entities
//!
use crate::api::{ClusterConfig, Database};
use crate::telemetry::{Entity, Integration};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashSet};

pub const CLUSTER_ENTITY_TYPE: &str = "redisecluster";
pub const DATABASE_ENTITY_TYPE: &str = "redisedb";

const INVENTORY_KEY: &str = "RedisEnterpriseType";

/// The cluster entity and one entity per database, keyed by database uid
#[derive(Debug, Clone)]
pub struct EntityMap {
    pub cluster: Entity,
    pub databases: BTreeMap<u64, Entity>,
}

/// Entity name of a database
#[must_use]
pub fn database_entity_name(cluster: &str, database: &str) -> String {
    format!("{cluster}:{database}")
}

/// Create the entities for a cluster and its databases
pub fn map_entities(cluster: &ClusterConfig, databases: &[Database]) -> Result<EntityMap> {
    let cluster_entity = Entity::new(&cluster.name, CLUSTER_ENTITY_TYPE)?;

    let mut names = HashSet::new();
    let mut entities = BTreeMap::new();
    for db in databases {
        if db.name.is_empty() {
            return Err(Error::Precondition(format!(
                "database {} has an empty name",
                db.uid
            )));
        }
        let name = database_entity_name(&cluster.name, &db.name);
        if !names.insert(name.clone()) {
            return Err(Error::Precondition(format!("duplicate database entity {name}")));
        }
        let entity = Entity::new(&name, DATABASE_ENTITY_TYPE)?;
        if entities.insert(db.uid, entity).is_some() {
            return Err(Error::Precondition(format!("duplicate database uid {}", db.uid)));
        }
    }

    Ok(EntityMap {
        cluster: cluster_entity,
        databases: entities,
    })
}

impl EntityMap {
    /// Tag every entity with its kind
    pub fn tag_inventory(&mut self) {
        self.cluster
            .set_inventory_item(INVENTORY_KEY, "value", "cluster");
        for entity in self.databases.values_mut() {
            entity.set_inventory_item(INVENTORY_KEY, "value", "database");
        }
    }

    /// Move the entities into `integration`, the cluster first
    pub fn add_to(self, integration: &mut Integration) {
        integration.add_entity(self.cluster);
        for entity in self.databases.into_values() {
            integration.add_entity(entity);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn db(uid: u64, name: &str) -> Database {
        Database {
            uid,
            name: name.to_string(),
            memory_size: 100,
            shards_count: 1,
            endpoints: 1,
            bigstore: false,
            crdt: false,
            crdt_sync: None,
        }
    }

    fn cluster(name: &str) -> ClusterConfig {
        ClusterConfig {
            name: name.to_string(),
        }
    }

    #[test]
    fn one_entity_per_database() {
        let dbs = vec![db(1, "a"), db(2, "b"), db(5, "c")];
        let map = map_entities(&cluster("c1"), &dbs).unwrap();

        assert_eq!(map.cluster.name(), "c1");
        assert_eq!(map.cluster.entity_type(), CLUSTER_ENTITY_TYPE);
        assert_eq!(map.databases.len(), dbs.len());
        assert_eq!(map.databases[&5].name(), "c1:c");
        assert!(map
            .databases
            .values()
            .all(|e| e.entity_type() == DATABASE_ENTITY_TYPE));
    }

    #[test]
    fn no_databases() {
        let map = map_entities(&cluster("c1"), &[]).unwrap();
        assert!(map.databases.is_empty());
    }

    #[test]
    fn empty_names() {
        assert!(matches!(
            map_entities(&cluster(""), &[]),
            Err(Error::Precondition(_))
        ));
        assert!(matches!(
            map_entities(&cluster("c1"), &[db(1, "")]),
            Err(Error::Precondition(_))
        ));
    }

    #[test]
    fn duplicates() {
        assert!(map_entities(&cluster("c1"), &[db(1, "a"), db(2, "a")]).is_err());
        assert!(map_entities(&cluster("c1"), &[db(1, "a"), db(1, "b")]).is_err());
    }

    #[test]
    fn inventory() {
        let mut map = map_entities(&cluster("c1"), &[db(1, "a")]).unwrap();
        map.tag_inventory();
        assert_eq!(
            map.cluster.inventory_item("RedisEnterpriseType", "value"),
            Some("cluster")
        );
        assert_eq!(
            map.databases[&1].inventory_item("RedisEnterpriseType", "value"),
            Some("database")
        );

        let mut integration = Integration::new("n", "v");
        map.add_to(&mut integration);
        assert_eq!(integration.entities()[0].name(), "c1");
        assert_eq!(integration.entities()[1].name(), "c1:a");
    }
}
