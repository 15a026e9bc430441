pub mod id_map;
pub mod index_containers;
pub mod typed_id_map;
