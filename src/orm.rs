#[allow(warnings, clippy::all)]
pub(crate) mod link {
    use sea_orm::entity::prelude::*;

    #[sea_orm::model]
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "links")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub key: String,
        pub short_url: String,
        #[sea_orm(unique)]
        pub long_url: String,
    }

    impl ActiveModelBehavior for ActiveModel {}
}
