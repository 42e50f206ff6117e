//! Read access to the node/VM mirror. Writes belong to reconciliation.

use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
};
use uuid::Uuid;

use crate::db::entities::{node, prelude::*, vm};

pub async fn list_nodes<C: ConnectionTrait>(db: &C) -> Result<Vec<node::Model>, DbErr> {
    Node::find()
        .order_by_asc(NodeColumn::Hostname)
        .all(db)
        .await
}

pub async fn list_vms<C: ConnectionTrait>(
    db: &C,
    node_id: Option<Uuid>,
) -> Result<Vec<vm::Model>, DbErr> {
    let mut query = Vm::find();
    if let Some(node_id) = node_id {
        query = query.filter(VmColumn::NodeId.eq(node_id));
    }
    query
        .order_by_asc(VmColumn::Name)
        .order_by_asc(VmColumn::Vmid)
        .all(db)
        .await
}

pub async fn get_vm<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<vm::Model>, DbErr> {
    Vm::find_by_id(id).one(db).await
}

/// Loads a VM together with its owning node (if the node row still exists).
pub async fn get_vm_with_node<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> Result<Option<(vm::Model, Option<node::Model>)>, DbErr> {
    Vm::find_by_id(id).find_also_related(Node).one(db).await
}
