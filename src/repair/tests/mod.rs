mod component_tests;
