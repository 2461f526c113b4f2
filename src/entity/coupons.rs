use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub name: String,
    pub discount_bp: i32,
    pub capacity: i32,
    pub issued_count: i32,
    pub starts_at: DateTimeWithTimeZone,
    pub ends_at: DateTimeWithTimeZone,
    pub valid_hours: i32,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::issued_coupons::Entity")]
    IssuedCoupons,
}

impl Related<super::issued_coupons::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IssuedCoupons.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
