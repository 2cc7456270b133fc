use bindery_api::Entity;

#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(name = "Person")]
pub struct Person {
    #[field(name = "id")]
    pub id: u64,

    #[field(name = "name")]
    pub name: String,
}
