mod planner;
mod test_utils;
