mod handler;
mod model;

pub use handler::{
    add_event, add_place, complete_collection, copy_place, create_collection, delete_collection,
    delete_event, delete_place, get_collection, get_hearts, list_collections, put_back_collection,
    set_thumbnail, set_visited, share_collection, toggle_heart,
};
pub use model::{
    AddEventRequest, AddPlaceRequest, CollectionIdRequest, CopyPlaceRequest,
    CreateCollectionRequest, EventRequest, HeartResponse, HeartsQuery, HeartsResponse, PlaceInput,
    PlaceRequest, ShareRequest, ThumbnailResponse, VisitedRequest,
};
